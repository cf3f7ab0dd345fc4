// src/runtime/package.rs
//! Loadable package handles
//!
//! A package is a bundle of code/data installed into interpreter
//! instances. Installation mechanics live with the package tooling;
//! this core only depends on how packages are constructed (from a
//! location string or from an abstract random-access byte reader) and
//! on the manager they are bound to.

use crate::runtime::manager::InterpreterManager;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Random-access byte source a package can be read from.
pub trait ReadAdapter: Send + Sync {
    /// Total length of the underlying bytes.
    fn size(&self) -> Result<u64>;

    /// Read up to `buf.len()` bytes starting at `offset`; returns how
    /// many were read (0 past the end).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

impl ReadAdapter for Bytes {
    fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset.min(self.len() as u64) as usize;
        let available = &self[offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        Ok(count)
    }
}

enum PackageSource {
    Uri(String),
    Reader(Arc<dyn ReadAdapter>),
}

/// A package bound to the manager that will install it.
pub struct Package {
    manager: Arc<InterpreterManager>,
    source: PackageSource,
}

impl Package {
    /// Construct a package from a location string.
    pub fn new(uri: impl Into<String>, manager: Arc<InterpreterManager>) -> Result<Self> {
        let uri = uri.into();
        if uri.is_empty() {
            return Err(EngineError::LoadFailed(
                "expected a non-empty package location".to_string(),
            ));
        }
        debug!("Opened package at '{}'", uri);
        Ok(Self {
            manager,
            source: PackageSource::Uri(uri),
        })
    }

    /// Construct a package from a random-access byte reader.
    pub fn from_reader(
        reader: Arc<dyn ReadAdapter>,
        manager: Arc<InterpreterManager>,
    ) -> Result<Self> {
        let size = reader.size()?;
        debug!("Opened package from reader ({} bytes)", size);
        Ok(Self {
            manager,
            source: PackageSource::Reader(reader),
        })
    }

    /// The package's location, when it was opened from one.
    pub fn uri(&self) -> Option<&str> {
        match &self.source {
            PackageSource::Uri(uri) => Some(uri),
            PackageSource::Reader(_) => None,
        }
    }

    /// The pool this package installs into.
    pub fn manager(&self) -> &Arc<InterpreterManager> {
        &self.manager
    }
}
