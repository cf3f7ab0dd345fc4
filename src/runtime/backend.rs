// src/runtime/backend.rs
//! Opaque embedded-runtime capability
//!
//! The engine never interprets what the embedded runtime does; it only
//! needs a fixed capability surface: execute code, look values up and
//! bridge them, serialize an object out, materialize a serialized object
//! in, and drop a materialization. Backends come out of a freshly loaded
//! module ([`crate::loader::EmbeddedModule::new_backend`]) and are
//! internally synchronized; all mutation goes through sessions.

use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};

/// Handle to a value living inside one interpreter instance.
///
/// Handles are only meaningful to the backend that issued them; moving a
/// value between instances goes through the replication protocol, never
/// through an `Obj`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obj(pub(crate) u64);

/// Host-side bridge values.
///
/// The small set of shapes that may cross the embedding boundary by
/// value: enough for instance tagging, reflection results, and calling
/// conventions. Everything richer stays inside the runtime and crosses
/// only as a pickled [`crate::runtime::ReplicatedObj`] payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

/// Module-source lookup installed by the manager so embedded imports can
/// be satisfied from in-process strings instead of the filesystem.
pub type FindModuleHook = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// One isolated instance of the embedded runtime.
pub trait InterpreterBackend: Send + Sync {
    /// Open a session. Sessions borrow the backend and are the only way
    /// to touch its state.
    fn new_session(&self) -> Box<dyn SessionBackend + '_>;

    /// Install the module-source lookup consulted by the instance's
    /// import machinery. Not retroactive for already-resolved imports.
    fn set_find_module(&self, hook: FindModuleHook);
}

/// The per-session implementation surface.
pub trait SessionBackend {
    /// Look up a value by module-qualified name.
    fn global(&mut self, module: &str, name: &str) -> Result<Obj>;

    /// Bind a value under a module-qualified name.
    fn set_global(&mut self, module: &str, name: &str, value: Obj) -> Result<()>;

    /// Run a chunk of source text in the instance.
    fn execute(&mut self, code: &str) -> Result<Obj>;

    /// Call a callable value.
    fn call(&mut self, target: Obj, args: &[Obj]) -> Result<Obj>;

    /// Bring a host value into the instance.
    fn from_value(&mut self, value: &Value) -> Result<Obj>;

    /// Bring an instance value out to the host, when it is bridgeable.
    fn to_value(&mut self, obj: Obj) -> Result<Value>;

    /// Serialize a value into an opaque payload.
    fn pickle(&mut self, obj: Obj) -> Result<Vec<u8>>;

    /// Return the materialization cached under `object_id`, or
    /// deserialize `payload` fresh and cache it under that id.
    fn unpickle_or_get(&mut self, object_id: u64, payload: &[u8]) -> Result<Obj>;

    /// Drop this instance's materialization for `object_id`, if any.
    fn unload(&mut self, object_id: u64) -> Result<()>;
}
