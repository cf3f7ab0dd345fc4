// src/loader/mod.rs
//! Embedded runtime image loading
//!
//! This module owns everything between "a shared-library image linked
//! into the process as bytes" and "a live, isolated interpreter backend":
//!
//! - **Images**: process-wide, set-once registration of the embedded
//!   runtime image(s)
//! - **Host**: the capability interface for materializing an image as a
//!   loadable module and resolving its fixed entry points
//! - **Dlopen**: the real host implementation (temp file, `dlopen` with
//!   instance-private symbol binding, immediate unlink)

pub mod dlopen;
pub mod host;
pub mod images;

// Re-export commonly used types
pub use dlopen::DlopenHost;
pub use host::{EmbeddedModule, ModuleHost};
pub use images::{register_embedded_runtime, EmbeddedImage, ImageSet};

#[cfg(feature = "prelinked")]
pub use images::register_embedded_runtime_accel;
