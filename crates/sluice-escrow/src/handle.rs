//! Shared, serialized access to an [`Escrow`].
//!
//! The escrow itself is single-threaded. Hosts that receive requests on
//! several threads clone an [`EscrowHandle`]; every call takes the same
//! `parking_lot::Mutex`, so operations still run strictly one at a time.

use std::sync::Arc;

use parking_lot::Mutex;

use sluice_core::traits::{ReceiverResolver, ValueTransfer};

use crate::escrow::Escrow;

/// Cloneable handle to one escrow instance.
pub struct EscrowHandle<B, R> {
    inner: Arc<Mutex<Escrow<B, R>>>,
}

impl<B, R> Clone for EscrowHandle<B, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: ValueTransfer, R: ReceiverResolver> EscrowHandle<B, R> {
    pub fn new(escrow: Escrow<B, R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(escrow)),
        }
    }

    /// Run `f` with exclusive access. Nothing else touches the escrow until
    /// `f` returns, so a sequence of calls inside `f` is atomic with respect
    /// to other handles.
    pub fn with<T>(&self, f: impl FnOnce(&mut Escrow<B, R>) -> T) -> T {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Like [`with`](Self::with) but only reads.
    pub fn read<T>(&self, f: impl FnOnce(&Escrow<B, R>) -> T) -> T {
        let guard = self.inner.lock();
        f(&guard)
    }

    /// Unwrap the escrow if this is the last handle.
    pub fn try_into_inner(self) -> Result<Escrow<B, R>, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
