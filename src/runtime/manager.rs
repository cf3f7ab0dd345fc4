// src/runtime/manager.rs
//! Interpreter pool management
//!
//! The manager owns a fixed-size pool of isolated interpreter instances
//! plus the shared load balancer, and is the single entry point for
//! acquiring access. Pool size never changes after construction.
//!
//! # Architecture
//!
//! ```text
//! InterpreterManager
//! ├─ Instances: [Interpreter 0, Interpreter 1, ...]   (fixed pool)
//! ├─ LoadBalancer: [uses 0, uses 1, ...]              (atomic counters)
//! ├─ next_object_id                                   (replication ids)
//! └─ module sources: name → source text               (import hook)
//! ```

use crate::runtime::backend::Value;
use crate::runtime::interpreter::{Interpreter, InterpreterConfig};
use crate::runtime::load_balancer::LoadBalancer;
use crate::runtime::package::{Package, ReadAdapter};
use crate::runtime::session::InterpreterSession;
use crate::utils::errors::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the reflection helper module pre-registered into every pool:
/// given a callable, returns the ordered list of its declared parameter
/// names. Used by calling conventions that need argument names rather
/// than positions.
pub const REFLECT_MODULE: &str = "reflect";

const REFLECT_MODULE_SOURCE: &str =
    "def argument_names(fn):\n    return __reflect_params__(fn)\n";

/// Owns the interpreter pool and arbitrates access to it.
pub struct InterpreterManager {
    instances: Vec<Interpreter>,
    resources: LoadBalancer,
    next_object_id: AtomicU64,
    module_sources: Arc<DashMap<String, String>>,
}

impl InterpreterManager {
    /// Construct a pool of `n` instances from the process-wide image
    /// registry.
    pub fn new(n: usize) -> Result<Arc<Self>> {
        Self::with_config(n, InterpreterConfig::default())
    }

    /// Construct a pool of `n` instances with explicit configuration.
    ///
    /// Instances are stood up sequentially; each one is tagged with its
    /// ordinal index (exposed to embedded code so callers can partition
    /// devices/work across instances) and wired to the manager's
    /// module-source lookup. Any failure aborts construction; a
    /// partially constructed pool is not a supported state.
    pub fn with_config(n: usize, config: InterpreterConfig) -> Result<Arc<Self>> {
        info!("Initializing interpreter pool with {} instances", n);

        let module_sources: Arc<DashMap<String, String>> = Arc::new(DashMap::new());
        let mut instances = Vec::with_capacity(n);

        for ordinal in 0..n {
            let interpreter = Interpreter::new(&config)?;

            {
                let mut session = interpreter.acquire_session();
                let index = session.from_value(&Value::Int(ordinal as i64))?;
                session.set_global("runtime", "instance_index", index)?;
            }

            let sources = Arc::clone(&module_sources);
            interpreter.backend().set_find_module(Box::new(move |name| {
                sources.get(name).map(|entry| entry.value().clone())
            }));

            debug!("Interpreter {} initialized", ordinal);
            instances.push(interpreter);
        }

        let manager = Arc::new(Self {
            resources: LoadBalancer::new(n),
            instances,
            next_object_id: AtomicU64::new(0),
            module_sources,
        });
        manager.register_module_source(REFLECT_MODULE, REFLECT_MODULE_SOURCE);

        Ok(manager)
    }

    /// Acquire a session on a load-balanced instance. Never blocks:
    /// with every instance busy this degrades to sharing the
    /// least-loaded one.
    pub fn acquire_one(self: &Arc<Self>) -> InterpreterSession<'_> {
        let slot = self.resources.acquire();
        debug!("Acquired interpreter slot {}", slot);
        InterpreterSession::load_balanced(
            self.instances[slot].backend().new_session(),
            Arc::clone(self),
            slot,
        )
    }

    /// Every instance in the pool, in ordinal order.
    pub fn all_instances(&self) -> &[Interpreter] {
        &self.instances
    }

    /// Fixed pool size.
    pub fn pool_size(&self) -> usize {
        self.instances.len()
    }

    /// Register source text for a module name, visible to every
    /// instance's import machinery from now on (not retroactive for
    /// already-resolved imports).
    pub fn register_module_source(&self, name: impl Into<String>, source: impl Into<String>) {
        let name = name.into();
        debug!("Registered module source '{}'", name);
        self.module_sources.insert(name, source.into());
    }

    /// Load a package from a location string.
    pub fn load_package(self: &Arc<Self>, uri: impl Into<String>) -> Result<Package> {
        Package::new(uri, Arc::clone(self))
    }

    /// Load a package from a random-access byte reader.
    pub fn load_package_from(self: &Arc<Self>, reader: Arc<dyn ReadAdapter>) -> Result<Package> {
        Package::from_reader(reader, Arc::clone(self))
    }

    /// Snapshot of per-slot session counts.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pool_size: self.pool_size(),
            users: (0..self.pool_size())
                .map(|slot| self.resources.users(slot))
                .collect(),
        }
    }

    /// Allocate the next replicated-object id. Ids are unique and
    /// strictly increasing for this manager's lifetime, and never reused
    /// across any instance's materialization cache.
    pub(crate) fn allocate_object_id(&self) -> u64 {
        self.next_object_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn resources(&self) -> &LoadBalancer {
        &self.resources
    }
}

/// Pool usage snapshot.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub pool_size: usize,
    pub users: Vec<u64>,
}

impl PoolStats {
    /// Number of slots with no active session.
    pub fn idle_slots(&self) -> usize {
        self.users.iter().filter(|count| **count == 0).count()
    }
}
