// src/lib.rs
//! Hydra Engine Library
//!
//! Multi-instance embedded interpreter runtime: loads several
//! independent, isolated copies of an embedded interpreter into a single
//! process, each in its own dynamically-loaded module instance, and
//! provides load-balanced session acquisition plus safe cross-instance
//! object replication.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **loader**: Embedded image registry, module-host capability, dlopen
//! - **runtime**: Pool manager, load balancer, sessions, replication
//! - **utils**: Errors and shared helpers
//!
//! The embedded interpreter itself is opaque: the engine consumes it as
//! a capability (execute, acquire a session, serialize/deserialize
//! objects, resolve modules by name) through a handful of well-known
//! entry-point symbols.

// Public module exports
pub mod loader;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use loader::{register_embedded_runtime, DlopenHost, EmbeddedImage, ImageSet, ModuleHost};
pub use runtime::{
    Interpreter, InterpreterConfig, InterpreterManager, InterpreterSession, ReplicatedCallable,
    ReplicatedObj, Value,
};
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
        }
    }
}
