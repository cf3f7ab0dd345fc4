// src/runtime/session.rs
//! Scoped access to one interpreter instance
//!
//! A session is a transient handle borrowed from exactly one
//! [`Interpreter`](crate::runtime::Interpreter) for the duration of one
//! logical operation. Sessions obtained through the manager's load
//! balancer carry the slot they must release on drop; sessions bound
//! directly to an instance carry no such obligation.
//!
//! Every operation that crosses into the embedded runtime is annotated
//! on the way out, so callers see one consistent error kind no matter
//! where inside the runtime the failure started.

use crate::runtime::backend::{Obj, SessionBackend, Value};
use crate::runtime::manager::InterpreterManager;
use crate::runtime::replicated::{ReplicatedObj, ReplicatedObjImpl};
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

/// A borrowed, single-operation handle onto one interpreter instance.
pub struct InterpreterSession<'a> {
    backend: Box<dyn SessionBackend + 'a>,

    /// Present when the session was acquired through a manager; required
    /// for creating replicated objects.
    manager: Option<Arc<InterpreterManager>>,

    /// Load-balancer slot to release on drop; only set for sessions
    /// obtained via load-balanced acquisition.
    lb_slot: Option<usize>,

    /// The session's current value, bound by
    /// [`ReplicatedObj::acquire_session`](crate::runtime::ReplicatedObj::acquire_session).
    current: Option<Obj>,
}

impl<'a> InterpreterSession<'a> {
    /// Session bound directly to a specific interpreter.
    pub(crate) fn direct(backend: Box<dyn SessionBackend + 'a>) -> Self {
        Self {
            backend,
            manager: None,
            lb_slot: None,
            current: None,
        }
    }

    /// Session acquired through the manager's load balancer.
    pub(crate) fn load_balanced(
        backend: Box<dyn SessionBackend + 'a>,
        manager: Arc<InterpreterManager>,
        slot: usize,
    ) -> Self {
        Self {
            backend,
            manager: Some(manager),
            lb_slot: Some(slot),
            current: None,
        }
    }

    /// Look up a value by module-qualified name.
    pub fn global(&mut self, module: &str, name: &str) -> Result<Obj> {
        self.backend
            .global(module, name)
            .map_err(|e| e.in_op("global lookup"))
    }

    /// Bind a value under a module-qualified name.
    pub fn set_global(&mut self, module: &str, name: &str, value: Obj) -> Result<()> {
        self.backend
            .set_global(module, name, value)
            .map_err(|e| e.in_op("global bind"))
    }

    /// Run a chunk of source text in this instance.
    pub fn execute(&mut self, code: &str) -> Result<Obj> {
        self.backend.execute(code).map_err(|e| e.in_op("execute"))
    }

    /// Call a callable value.
    pub fn call(&mut self, target: Obj, args: &[Obj]) -> Result<Obj> {
        self.backend
            .call(target, args)
            .map_err(|e| e.in_op("call"))
    }

    /// Bring a host value into this instance.
    pub fn from_value(&mut self, value: &Value) -> Result<Obj> {
        self.backend
            .from_value(value)
            .map_err(|e| e.in_op("value bridge"))
    }

    /// Bring a value out to the host, when it is bridgeable.
    pub fn to_value(&mut self, obj: Obj) -> Result<Value> {
        self.backend
            .to_value(obj)
            .map_err(|e| e.in_op("value bridge"))
    }

    /// Pickle `obj` out of this session into a handle that can be
    /// materialized in any instance of the pool.
    ///
    /// Requires the session to have been acquired through an
    /// [`InterpreterManager`]: objects created from a session bound to a
    /// bare interpreter would have no defined cross-instance identity.
    pub fn create_movable(&mut self, obj: Obj) -> Result<ReplicatedObj> {
        let manager = self.manager.clone().ok_or(EngineError::NotManaged)?;
        let payload = self
            .backend
            .pickle(obj)
            .map_err(|e| e.in_op("serialize replicated object"))?;
        let object_id = manager.allocate_object_id();
        trace!("Created replicated object {}", object_id);
        Ok(ReplicatedObj::new(ReplicatedObjImpl::new(
            object_id,
            Bytes::from(payload),
            manager,
        )))
    }

    /// Materialize a replicated object inside this session.
    ///
    /// The payload is the source of truth: this instance either returns
    /// its cached materialization for the object's id or deserializes
    /// the payload fresh and caches it under that id.
    pub fn from_movable(&mut self, obj: &ReplicatedObj) -> Result<Obj> {
        self.backend
            .unpickle_or_get(obj.object_id(), obj.payload())
            .map_err(|e| e.in_op("materialize replicated object"))
    }

    /// Drop this instance's materialization of an object id.
    pub(crate) fn unload_object(&mut self, object_id: u64) -> Result<()> {
        self.backend
            .unload(object_id)
            .map_err(|e| e.in_op("unload replicated object"))
    }

    /// The session's current value, if one was bound.
    pub fn current(&self) -> Option<Obj> {
        self.current
    }

    pub(crate) fn bind_current(&mut self, obj: Obj) {
        self.current = Some(obj);
    }

    /// The load-balancer slot this session will release, if any.
    pub fn slot(&self) -> Option<usize> {
        self.lb_slot
    }
}

impl Drop for InterpreterSession<'_> {
    fn drop(&mut self) {
        // Exactly one free per load-balanced acquisition.
        if let (Some(manager), Some(slot)) = (&self.manager, self.lb_slot.take()) {
            manager.resources().free(slot);
        }
    }
}
