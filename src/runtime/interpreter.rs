// src/runtime/interpreter.rs
//! One isolated interpreter instance
//!
//! Owns exactly one dynamically-loaded module and the backend obtained
//! from it. Instances are created once at manager construction and
//! destroyed at manager teardown; teardown order is load-bearing: the
//! backend must finalize while the module is still mapped, otherwise the
//! runtime finalizer runs in unmapped memory.

use crate::loader::dlopen::DlopenHost;
use crate::loader::host::{EmbeddedModule, ModuleHost};
use crate::loader::images::ImageSet;
use crate::runtime::backend::InterpreterBackend;
use crate::runtime::session::InterpreterSession;
use crate::utils::errors::Result;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Configuration for standing up interpreter instances.
///
/// The default pulls images from the process-wide registry and loads
/// them with the `dlopen` host; both pieces are injectable so embedders
/// (and tests) can supply their own.
#[derive(Clone)]
pub struct InterpreterConfig {
    /// Embedded images to load instances from.
    pub images: ImageSet,

    /// Module-materialization capability.
    pub host: Arc<dyn ModuleHost>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            images: ImageSet::from_registry(),
            host: Arc::new(DlopenHost::new()),
        }
    }
}

impl fmt::Debug for InterpreterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterConfig")
            .field("images", &self.images)
            .finish()
    }
}

/// One isolated instance of the embedded runtime.
pub struct Interpreter {
    // Field order is load-bearing: the backend drops (and finalizes the
    // runtime) before the module it came from is unloaded.
    backend: Box<dyn InterpreterBackend>,
    // Held for Drop: unloading the module is the last thing that happens
    // to an instance.
    _module: Box<dyn EmbeddedModule>,
}

impl Interpreter {
    /// Load a fresh instance from the configured image.
    pub(crate) fn new(config: &InterpreterConfig) -> Result<Self> {
        let image = config.images.select()?;
        let module = config.host.materialize_image(image.bytes())?;

        // Outside prelinked builds the module must learn its own handle
        // before anything else runs, so it can unload its dependent
        // libraries at teardown.
        #[cfg(not(feature = "prelinked"))]
        module.register_self()?;

        let backend = module.new_backend()?;
        debug!("Interpreter instance stood up ({} byte image)", image.bytes().len());

        Ok(Self {
            backend,
            _module: module,
        })
    }

    /// Open a session bound to this specific instance.
    ///
    /// Sessions acquired this way carry no load-balancer obligation and
    /// cannot create replicated objects (no manager, so no defined
    /// cross-instance identity).
    pub fn acquire_session(&self) -> InterpreterSession<'_> {
        InterpreterSession::direct(self.backend.new_session())
    }

    pub(crate) fn backend(&self) -> &dyn InterpreterBackend {
        self.backend.as_ref()
    }
}
