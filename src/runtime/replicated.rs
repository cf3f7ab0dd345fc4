// src/runtime/replicated.rs
//! Cross-instance object replication
//!
//! A replicated object lives, by value, independently of any single
//! interpreter instance: the pickled payload is the source of truth, and
//! each instance lazily builds its own live materialization keyed by the
//! object's id. Distinct instances' materializations are never assumed
//! to be the same underlying value, only equivalent by construction.
//!
//! Handles are reference counted; dropping the last handle unloads the
//! object from every instance in the pool. Unloading drops only the
//! per-instance cache entries, never the payload, so a later
//! materialization reconstructs fresh from the payload.

use crate::runtime::backend::Value;
use crate::runtime::interpreter::Interpreter;
use crate::runtime::manager::{InterpreterManager, REFLECT_MODULE};
use crate::runtime::session::InterpreterSession;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::warn;

/// Reference-counted handle to a replicated object.
#[derive(Clone)]
pub struct ReplicatedObj {
    inner: Arc<ReplicatedObjImpl>,
}

impl ReplicatedObj {
    pub(crate) fn new(inner: ReplicatedObjImpl) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The pool-wide identity of this object.
    pub fn object_id(&self) -> u64 {
        self.inner.object_id
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.inner.payload
    }

    /// Acquire a session with this object already materialized and bound
    /// as the session's current value.
    ///
    /// With `on_this_interpreter` the session is bound to that specific
    /// instance; otherwise it is load-balanced across the pool.
    pub fn acquire_session<'s>(
        &'s self,
        on_this_interpreter: Option<&'s Interpreter>,
    ) -> Result<InterpreterSession<'s>> {
        let mut session = match on_this_interpreter {
            Some(interpreter) => interpreter.acquire_session(),
            None => self.inner.manager.acquire_one(),
        };
        let obj = session.from_movable(self)?;
        session.bind_current(obj);
        Ok(session)
    }

    /// Drop materializations of this object: everywhere with `None`, or
    /// on one specific instance.
    pub fn unload(&self, on_this_interpreter: Option<&Interpreter>) -> Result<()> {
        self.inner.unload(on_this_interpreter)
    }
}

/// Shared state behind [`ReplicatedObj`] handles: the object's id, its
/// immutable pickled payload, and the owning pool.
pub struct ReplicatedObjImpl {
    object_id: u64,
    payload: Bytes,
    manager: Arc<InterpreterManager>,
}

impl ReplicatedObjImpl {
    pub(crate) fn new(object_id: u64, payload: Bytes, manager: Arc<InterpreterManager>) -> Self {
        Self {
            object_id,
            payload,
            manager,
        }
    }

    /// Drop materializations for this object's id. With no specific
    /// interpreter this sweeps every instance in the pool, since any of
    /// them might hold a materialized copy.
    fn unload(&self, on_this_interpreter: Option<&Interpreter>) -> Result<()> {
        match on_this_interpreter {
            None => {
                for interpreter in self.manager.all_instances() {
                    self.unload(Some(interpreter))?;
                }
                Ok(())
            }
            Some(interpreter) => {
                let mut session = interpreter.acquire_session();
                session.unload_object(self.object_id)
            }
        }
    }
}

impl Drop for ReplicatedObjImpl {
    fn drop(&mut self) {
        // Last handle gone: best-effort sweep across all instances.
        if let Err(e) = self.unload(None) {
            warn!(
                "Failed to unload replicated object {}: {}",
                self.object_id, e
            );
        }
    }
}

/// A replicated callable plus the reflection plumbing around it: recover
/// its declared parameter names, or invoke it with host values.
pub struct ReplicatedCallable {
    target: ReplicatedObj,
}

impl ReplicatedCallable {
    pub fn new(target: ReplicatedObj) -> Self {
        Self { target }
    }

    /// The ordered list of the callable's declared parameter names,
    /// recovered through the pool's pre-registered reflection module.
    pub fn argument_names(&self) -> Result<Vec<String>> {
        let mut session = self.target.acquire_session(None)?;
        let target = session.from_movable(&self.target)?;
        let reflect = session.global(REFLECT_MODULE, "argument_names")?;
        let names = session.call(reflect, &[target])?;

        match session.to_value(names)? {
            Value::List(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Str(name) => Ok(name),
                    other => Err(EngineError::Backend(format!(
                        "expected an argument name string, got {:?}",
                        other
                    ))),
                })
                .collect(),
            other => Err(EngineError::Backend(format!(
                "expected an argument name list, got {:?}",
                other
            ))),
        }
    }

    /// Invoke the callable on a load-balanced instance with host values.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let mut session = self.target.acquire_session(None)?;
        let callee = session.from_movable(&self.target)?;

        let mut arg_objs = Vec::with_capacity(args.len());
        for value in args {
            arg_objs.push(session.from_value(value)?);
        }

        let result = session.call(callee, &arg_objs)?;
        session.to_value(result)
    }
}
