//! Thread-safe handle for independent callers sharing one coordinator.

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use deed_registry::{AssetId, AssetRegistry, ID};

use crate::{Escrow, EscrowError, Result};

/// Cloneable handle to an [`Escrow`]. Operations from different threads are
/// serialized; each runs to completion before the next one starts.
///
/// A call issued from the thread that is already inside an operation (for
/// example by registry code invoked during settlement) is rejected with
/// [`EscrowError::Reentrant`].
pub struct SharedEscrow<R> {
    escrow: Arc<Mutex<Escrow<R>>>,
    running: Arc<Mutex<Option<ThreadId>>>,
}

impl<R> Clone for SharedEscrow<R> {
    fn clone(&self) -> Self {
        Self {
            escrow: Arc::clone(&self.escrow),
            running: Arc::clone(&self.running),
        }
    }
}

// Clears the running marker when an operation ends, even on panic.
struct Running<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut slot = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }
}

impl<R> SharedEscrow<R> {
    pub fn new(escrow: Escrow<R>) -> Self {
        Self {
            escrow: Arc::new(Mutex::new(escrow)),
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `op` with exclusive access to the coordinator.
    pub fn with<T>(&self, op: impl FnOnce(&mut Escrow<R>) -> Result<T>) -> Result<T> {
        let me = thread::current().id();
        if *self.running.lock().map_err(|_| EscrowError::Unavailable)? == Some(me) {
            return Err(EscrowError::Reentrant);
        }

        let mut escrow = self.escrow.lock().map_err(|_| EscrowError::Unavailable)?;
        *self.running.lock().map_err(|_| EscrowError::Unavailable)? = Some(me);
        let _running = Running(&self.running);
        op(&mut *escrow)
    }

    /// Read from the coordinator.
    pub fn read<T>(&self, view: impl FnOnce(&Escrow<R>) -> T) -> Result<T> {
        self.with(|escrow| Ok(view(escrow)))
    }
}

impl<R: AssetRegistry> SharedEscrow<R> {
    pub fn list(
        &self,
        caller: &ID,
        asset: AssetId,
        buyer: ID,
        purchase_price: u128,
        escrow_amount: u128,
    ) -> Result<()> {
        self.with(|e| e.list(caller, asset, buyer, purchase_price, escrow_amount))
    }

    pub fn deposit_earnest(&self, caller: &ID, asset: AssetId, value: u128) -> Result<()> {
        self.with(|e| e.deposit_earnest(caller, asset, value))
    }

    pub fn fund(&self, caller: &ID, asset: AssetId, value: u128) -> Result<()> {
        self.with(|e| e.fund(caller, asset, value))
    }

    pub fn update_inspection_status(&self, caller: &ID, asset: AssetId, passed: bool) -> Result<()> {
        self.with(|e| e.update_inspection_status(caller, asset, passed))
    }

    pub fn approve_sale(&self, caller: &ID, asset: AssetId) -> Result<()> {
        self.with(|e| e.approve_sale(caller, asset))
    }

    pub fn finalize_sale(&self, caller: &ID, asset: AssetId) -> Result<()> {
        self.with(|e| e.finalize_sale(caller, asset))
    }

    pub fn cancel_sale(&self, caller: &ID, asset: AssetId) -> Result<()> {
        self.with(|e| e.cancel_sale(caller, asset))
    }
}
