// src/loader/images.rs
//! Process-wide registry of embedded runtime images
//!
//! The embedded interpreter ships as a shared-library image linked into
//! the host binary as a byte range. The image is registered once, before
//! any `InterpreterManager` is constructed, and read many times (once per
//! interpreter instance). Registration is exposed two ways: a safe call
//! taking a `&'static [u8]`, and a C entry point taking start/end
//! pointers for build systems that emit the image as a symbol pair.
//!
//! Under the `prelinked` build configuration a second, accelerator-enabled
//! image can be registered side by side; instance construction prefers it
//! whenever it is present, whether or not an accelerator device is
//! currently available.

use crate::utils::errors::{EngineError, Result};
use once_cell::sync::OnceCell;
use std::fmt;
use tracing::{error, info};

static CPU_IMAGE: OnceCell<EmbeddedImage> = OnceCell::new();

#[cfg(feature = "prelinked")]
static ACCEL_IMAGE: OnceCell<EmbeddedImage> = OnceCell::new();

/// A registered shared-library image: a byte range that lives for the
/// whole process.
#[derive(Clone, Copy)]
pub struct EmbeddedImage {
    bytes: &'static [u8],
}

impl EmbeddedImage {
    /// Wrap a linked-in byte range. The range must be non-empty.
    pub fn new(bytes: &'static [u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(EngineError::Registration(
                "expected a non-empty embedded runtime image".to_string(),
            ));
        }
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.bytes
    }
}

impl fmt::Debug for EmbeddedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedImage")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Snapshot of the registered images, injectable into
/// `InterpreterConfig` so tests (and embedders with their own image
/// plumbing) can bypass the process-wide registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSet {
    pub cpu: Option<EmbeddedImage>,
    pub accel: Option<EmbeddedImage>,
}

impl ImageSet {
    /// Snapshot the process-wide registry.
    pub fn from_registry() -> Self {
        Self {
            cpu: CPU_IMAGE.get().copied(),
            #[cfg(feature = "prelinked")]
            accel: ACCEL_IMAGE.get().copied(),
            #[cfg(not(feature = "prelinked"))]
            accel: None,
        }
    }

    /// Pick the image a new instance should load. The accelerator image
    /// wins whenever the build configuration allows one to exist.
    pub fn select(&self) -> Result<EmbeddedImage> {
        #[cfg(feature = "prelinked")]
        if let Some(image) = self.accel {
            return Ok(image);
        }
        self.cpu.ok_or_else(|| {
            EngineError::Registration(
                "no embedded runtime image has been registered; \
                 call register_embedded_runtime before constructing an InterpreterManager"
                    .to_string(),
            )
        })
    }
}

/// Register the embedded runtime image. Set-once: a second registration
/// is a precondition violation.
pub fn register_embedded_runtime(bytes: &'static [u8]) -> Result<()> {
    let image = EmbeddedImage::new(bytes)?;
    CPU_IMAGE.set(image).map_err(|_| {
        EngineError::Registration("embedded runtime image already registered".to_string())
    })?;
    info!("Registered embedded runtime image ({} bytes)", bytes.len());
    Ok(())
}

/// Register the accelerator-enabled runtime image.
#[cfg(feature = "prelinked")]
pub fn register_embedded_runtime_accel(bytes: &'static [u8]) -> Result<()> {
    let image = EmbeddedImage::new(bytes)?;
    ACCEL_IMAGE.set(image).map_err(|_| {
        EngineError::Registration(
            "accelerator runtime image already registered".to_string(),
        )
    })?;
    info!(
        "Registered accelerator runtime image ({} bytes)",
        bytes.len()
    );
    Ok(())
}

unsafe fn slice_from_range(start: *const u8, end: *const u8) -> Result<&'static [u8]> {
    if start.is_null() || end.is_null() {
        return Err(EngineError::Registration(
            "expected non-null image range pointers".to_string(),
        ));
    }
    let len = (end as usize)
        .checked_sub(start as usize)
        .filter(|len| *len > 0)
        .ok_or_else(|| {
            EngineError::Registration(
                "expected a non-empty, non-inverted image range".to_string(),
            )
        })?;
    Ok(std::slice::from_raw_parts(start, len))
}

/// C entry point for build systems that link the image in as a symbol
/// pair. Returns 0 on success, -1 on a precondition violation.
///
/// # Safety
///
/// `start`/`end` must describe a readable byte range that stays valid
/// for the remainder of the process.
#[no_mangle]
pub unsafe extern "C" fn hydra_register_embedded_runtime(
    start: *const u8,
    end: *const u8,
) -> i32 {
    match slice_from_range(start, end).and_then(register_embedded_runtime) {
        Ok(()) => 0,
        Err(e) => {
            error!("Embedded runtime registration rejected: {}", e);
            -1
        }
    }
}

/// Accelerator-image variant of [`hydra_register_embedded_runtime`].
///
/// # Safety
///
/// Same contract as [`hydra_register_embedded_runtime`].
#[cfg(feature = "prelinked")]
#[no_mangle]
pub unsafe extern "C" fn hydra_register_embedded_runtime_accel(
    start: *const u8,
    end: *const u8,
) -> i32 {
    match slice_from_range(start, end).and_then(register_embedded_runtime_accel) {
        Ok(()) => 0,
        Err(e) => {
            error!("Accelerator runtime registration rejected: {}", e);
            -1
        }
    }
}
