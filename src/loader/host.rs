// src/loader/host.rs
//! Module-host capability interface
//!
//! Dynamically materializing "code as data" is inherently platform- and
//! ABI-specific, so the mechanics live behind this pair of traits. The
//! core logic that must stay portable and testable (temp-file lifecycle,
//! entry-point resolution order, teardown ordering) is written against
//! these traits and exercised with a fake host in tests; production uses
//! [`crate::loader::dlopen::DlopenHost`].

use crate::runtime::backend::InterpreterBackend;
use crate::utils::errors::Result;

/// Symbol name of the constructor entry point. Returns an opaque
/// backend handle; required in every build configuration.
pub const SYM_NEW_BACKEND: &[u8] = b"embedded_runtime_new_backend\0";

/// Symbol name of the self-registration entry point. The freshly loaded
/// module receives its own handle so it can unload its dependent
/// libraries later. Required outside `prelinked` builds.
pub const SYM_SET_SELF: &[u8] = b"embedded_runtime_set_self\0";

/// Symbol name of the flush entry point invoked at teardown, after the
/// backend has finalized but before the module is unloaded. Required
/// outside `prelinked` builds.
pub const SYM_FLUSH: &[u8] = b"embedded_runtime_flush_libs\0";

/// Materializes embedded images as loadable modules.
///
/// Every call must yield a module whose global state is independent of
/// every other module returned by this host; that independence is the
/// isolation boundary between interpreter instances.
pub trait ModuleHost: Send + Sync {
    fn materialize_image(&self, image: &[u8]) -> Result<Box<dyn EmbeddedModule>>;
}

/// One loaded copy of the embedded runtime.
///
/// Dropping the module unloads it. The caller is responsible for the
/// teardown order: every backend obtained from [`Self::new_backend`]
/// must be dropped while the module is still alive.
pub trait EmbeddedModule: Send + Sync {
    /// Hand the module its own handle (the [`SYM_SET_SELF`] entry
    /// point). Invoked once, before the first backend is constructed.
    fn register_self(&self) -> Result<()>;

    /// Construct the implementation object (the [`SYM_NEW_BACKEND`]
    /// entry point).
    fn new_backend(&self) -> Result<Box<dyn InterpreterBackend>>;
}
