//! Host-side services the loader calls back into.
//!
//! The loader owns its buffers as ordinary `Vec`s, but every buffer is first
//! reserved through [`HostSyms::allocate`] and handed back through
//! [`HostSyms::deallocate`] when the module is closed. This keeps the
//! caller's memory budget authoritative: a refused reservation fails the
//! operation with [`LoadError::AllocationFailure`].

use std::collections::HashMap;

use crate::error::LoadError;

/// Host allocation, error reporting and global symbol services.
pub trait HostSyms {
    /// Reserve `bytes` of host memory. Returning `false` refuses the request.
    fn allocate(&mut self, bytes: usize) -> bool;

    /// Return a reservation previously granted by [`HostSyms::allocate`].
    fn deallocate(&mut self, bytes: usize);

    /// Sink for every error the loader records.
    fn report_error(&mut self, error: &LoadError);

    /// Look up a global symbol defined outside this module.
    fn find_symbol(&self, _name: &str) -> Option<i32> {
        None
    }

    /// Publish a global symbol defined by this module.
    fn define_symbol(&mut self, _name: &str, _value: i32) {}
}

impl<H: HostSyms + ?Sized> HostSyms for &mut H {
    fn allocate(&mut self, bytes: usize) -> bool {
        (**self).allocate(bytes)
    }

    fn deallocate(&mut self, bytes: usize) {
        (**self).deallocate(bytes)
    }

    fn report_error(&mut self, error: &LoadError) {
        (**self).report_error(error)
    }

    fn find_symbol(&self, name: &str) -> Option<i32> {
        (**self).find_symbol(name)
    }

    fn define_symbol(&mut self, name: &str, value: i32) {
        (**self).define_symbol(name, value)
    }
}

/// Host services backed by the global allocator and `tracing`.
///
/// Keeps a symbol table so modules loaded in sequence can resolve each
/// other's globals, and tracks outstanding reservations.
#[derive(Debug, Default)]
pub struct DefaultSyms {
    outstanding: usize,
    limit: Option<usize>,
    errors: usize,
    globals: HashMap<String, i32>,
}

impl DefaultSyms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse reservations that would take the outstanding total above
    /// `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Bytes currently reserved.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Number of errors reported so far.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn globals(&self) -> &HashMap<String, i32> {
        &self.globals
    }

    /// Seed a global symbol, e.g. one exported by an already loaded image.
    pub fn insert_global(&mut self, name: &str, value: i32) {
        self.globals.insert(name.to_string(), value);
    }
}

impl HostSyms for DefaultSyms {
    fn allocate(&mut self, bytes: usize) -> bool {
        let total = self.outstanding.saturating_add(bytes);
        if matches!(self.limit, Some(limit) if total > limit) {
            return false;
        }
        self.outstanding = total;
        true
    }

    fn deallocate(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.outstanding, "releasing more than reserved");
        self.outstanding = self.outstanding.saturating_sub(bytes);
    }

    fn report_error(&mut self, error: &LoadError) {
        self.errors += 1;
        tracing::error!("{}", error);
    }

    fn find_symbol(&self, name: &str) -> Option<i32> {
        self.globals.get(name).copied()
    }

    fn define_symbol(&mut self, name: &str, value: i32) {
        self.globals.insert(name.to_string(), value);
    }
}
