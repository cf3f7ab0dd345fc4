// src/runtime/mod.rs
//! Interpreter pool runtime
//!
//! This module provides the core embedding runtime, including:
//!
//! - **Load Balancer**: Lock-free slot selection across the pool
//! - **Interpreter**: One isolated instance of the embedded runtime
//! - **Manager**: Fixed pool ownership and session acquisition
//! - **Session**: Scoped, single-operation access to one instance
//! - **Replicated**: Cross-instance object replication protocol
//! - **Package**: Loadable bundle handles (construction only)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 InterpreterManager (n)                  │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐               │
//! │  │ Instance │  │ Instance │  │ Instance │  ...          │
//! │  │ (module) │  │ (module) │  │ (module) │               │
//! │  └──────────┘  └──────────┘  └──────────┘               │
//! │        ▲             ▲             ▲                    │
//! │        │             │             │                    │
//! │        └──────── LoadBalancer ─────┘                    │
//! │                      │                                  │
//! │          Sessions (one per logical operation)           │
//! │                      │                                  │
//! │      ReplicatedObj (pickled payload + per-instance      │
//! │                     materialization caches)             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Every instance is its own dynamically-loaded copy of the embedded
//! runtime, so instances never share global state; the balancer never
//! blocks, and replicated objects carry their value as an immutable
//! payload materialized lazily wherever it is needed.

pub mod backend;
pub mod interpreter;
pub mod load_balancer;
pub mod manager;
pub mod package;
pub mod replicated;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use backend::{FindModuleHook, InterpreterBackend, Obj, SessionBackend, Value};
pub use interpreter::{Interpreter, InterpreterConfig};
pub use load_balancer::LoadBalancer;
pub use manager::{InterpreterManager, PoolStats, REFLECT_MODULE};
pub use package::{Package, ReadAdapter};
pub use replicated::{ReplicatedCallable, ReplicatedObj, ReplicatedObjImpl};
pub use session::InterpreterSession;
