// src/loader/dlopen.rs
//! Dynamic-loading module host
//!
//! Stands up one isolated copy of the embedded runtime per call:
//!
//! 1. Write the image bytes to a uniquely-named temporary file
//! 2. `dlopen` it with local (non-global) symbol scope and, outside
//!    `prelinked` builds, deep symbol binding, so two copies loaded this
//!    way do not collide on global symbol tables; that is what gives
//!    each interpreter its own isolated global state
//! 3. Unlink the temporary file immediately; the mapping keeps the
//!    backing inode alive for as long as the library stays loaded
//! 4. Resolve the fixed entry-point symbols eagerly; a missing required
//!    symbol fails the load

use crate::loader::host::{EmbeddedModule, ModuleHost, SYM_NEW_BACKEND};
#[cfg(not(feature = "prelinked"))]
use crate::loader::host::{SYM_FLUSH, SYM_SET_SELF};
use crate::runtime::backend::InterpreterBackend;
use crate::utils::errors::{EngineError, Result};
use libloading::os::unix::{Library, Symbol, RTLD_LAZY, RTLD_LOCAL};
use std::ffi::c_void;
use std::io::Write;
use tracing::debug;

type NewBackendFn = unsafe extern "C" fn() -> *mut c_void;
#[cfg(not(feature = "prelinked"))]
type SetSelfFn = unsafe extern "C" fn(*mut c_void);
#[cfg(not(feature = "prelinked"))]
type FlushFn = unsafe extern "C" fn();

/// Production [`ModuleHost`] backed by `dlopen`.
#[derive(Debug, Default)]
pub struct DlopenHost;

impl DlopenHost {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleHost for DlopenHost {
    fn materialize_image(&self, image: &[u8]) -> Result<Box<dyn EmbeddedModule>> {
        let mut tmp = tempfile::Builder::new()
            .prefix("hydra_interp_")
            .suffix(".so")
            .tempfile()
            .map_err(|e| {
                EngineError::LoadFailed(format!("failed to create temporary image file: {}", e))
            })?;
        tmp.write_all(image).map_err(|e| {
            EngineError::LoadFailed(format!("failed to write temporary image file: {}", e))
        })?;
        tmp.flush().map_err(|e| {
            EngineError::LoadFailed(format!("failed to write temporary image file: {}", e))
        })?;

        #[allow(unused_mut)]
        let mut flags = RTLD_LOCAL | RTLD_LAZY;
        #[cfg(not(feature = "prelinked"))]
        {
            flags |= libc::RTLD_DEEPBIND;
        }

        let lib = unsafe { Library::open(Some(tmp.path()), flags) }.map_err(|e| {
            EngineError::LoadFailed(format!("failed to load embedded runtime image: {}", e))
        })?;
        debug!(
            "Loaded embedded runtime image from {} ({} bytes)",
            tmp.path().display(),
            image.len()
        );

        // Only the load call needs the file; the mapping keeps the
        // inode alive.
        drop(tmp);

        // dlopen handle for the self-registration entry point. Round
        // trips through into_raw/from_raw so the Library still owns the
        // handle (and closes it on drop).
        #[cfg(not(feature = "prelinked"))]
        let (handle, lib) = {
            let handle = lib.into_raw();
            (handle, unsafe { Library::from_raw(handle) })
        };

        let new_backend = resolve::<NewBackendFn>(&lib, SYM_NEW_BACKEND)?;
        #[cfg(not(feature = "prelinked"))]
        let set_self = resolve::<SetSelfFn>(&lib, SYM_SET_SELF)?;
        #[cfg(not(feature = "prelinked"))]
        let flush = resolve::<FlushFn>(&lib, SYM_FLUSH)?;

        Ok(Box::new(DlModule {
            #[cfg(not(feature = "prelinked"))]
            handle,
            new_backend,
            #[cfg(not(feature = "prelinked"))]
            set_self,
            #[cfg(not(feature = "prelinked"))]
            flush,
            _lib: lib,
        }))
    }
}

/// Resolve a required entry point; absence is fatal to the load.
fn resolve<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    let symbol: Symbol<T> = unsafe { lib.get(name) }.map_err(|e| {
        EngineError::LoadFailed(format!(
            "embedded runtime image is missing the '{}' entry point: {}",
            String::from_utf8_lossy(&name[..name.len() - 1]),
            e
        ))
    })?;
    Ok(*symbol)
}

/// One loaded copy of the embedded runtime image.
struct DlModule {
    #[cfg(not(feature = "prelinked"))]
    handle: *mut c_void,
    new_backend: NewBackendFn,
    #[cfg(not(feature = "prelinked"))]
    set_self: SetSelfFn,
    #[cfg(not(feature = "prelinked"))]
    flush: FlushFn,
    // Declared last: the mapping must outlive the entry points above,
    // and Drop runs the flush entry point before this unloads it.
    _lib: Library,
}

// Safety: the raw handle and entry points are only invoked behind the
// construction/teardown sequence driven by a single owner; the handle
// itself is never shared with other modules.
unsafe impl Send for DlModule {}
unsafe impl Sync for DlModule {}

impl EmbeddedModule for DlModule {
    fn register_self(&self) -> Result<()> {
        #[cfg(not(feature = "prelinked"))]
        unsafe {
            (self.set_self)(self.handle);
        }
        Ok(())
    }

    fn new_backend(&self) -> Result<Box<dyn InterpreterBackend>> {
        let raw = unsafe { (self.new_backend)() };
        if raw.is_null() {
            return Err(EngineError::LoadFailed(
                "embedded runtime constructor returned a null backend".to_string(),
            ));
        }
        // The constructor returns a heap-allocated `Box<Box<dyn ...>>`
        // so the fat pointer crosses the C boundary behind a thin one.
        Ok(unsafe { *Box::from_raw(raw as *mut Box<dyn InterpreterBackend>) })
    }
}

impl Drop for DlModule {
    fn drop(&mut self) {
        // Backends are already gone by the time the owning Interpreter
        // drops this module; flush the module's own dependent libraries
        // while it is still mapped.
        #[cfg(not(feature = "prelinked"))]
        unsafe {
            (self.flush)();
        }
    }
}
