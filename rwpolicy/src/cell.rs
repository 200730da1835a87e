//! [RwPolicyCell] couples an [RwPolicyLock] with the value it protects so that the borrow checker,
//! rather than convention, keeps readers from mutating.  Shared guards hand out `&T`; exclusive
//! guards hand out `&mut T`.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use crate::lock::{Policy, RwPolicyLock};

/////////////////////////////////////////// RwPolicyCell ///////////////////////////////////////////

/// A value guarded by an [RwPolicyLock].
#[derive(Debug)]
pub struct RwPolicyCell<T> {
    lock: RwPolicyLock,
    value: UnsafeCell<T>,
}

impl<T> RwPolicyCell<T> {
    /// Guard `value` with a new lock that follows `policy`.
    pub fn new(policy: Policy, value: T) -> Self {
        Self {
            lock: RwPolicyLock::new(policy),
            value: UnsafeCell::new(value),
        }
    }

    /// The lock guarding the value.  Useful for inspecting its state.
    pub fn lock(&self) -> &RwPolicyLock {
        &self.lock
    }

    /// Acquire shared access.
    pub fn read(&self) -> CellReadGuard<'_, T> {
        self.lock.acquire_read();
        CellReadGuard { cell: self }
    }

    /// Acquire exclusive access.
    pub fn write(&self) -> CellWriteGuard<'_, T> {
        self.lock.acquire_write();
        CellWriteGuard { cell: self }
    }

    /// Access the value without locking.  Holding `&mut self` proves no guard is outstanding.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consume the cell and return the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

// Readers on different threads share &T, so T must be Sync as well as Send.
unsafe impl<T: Send> Send for RwPolicyCell<T> {}
unsafe impl<T: Send + Sync> Sync for RwPolicyCell<T> {}

/////////////////////////////////////////// CellReadGuard //////////////////////////////////////////

/// Shared access to the value of an [RwPolicyCell].
pub struct CellReadGuard<'a, T> {
    cell: &'a RwPolicyCell<T>,
}

impl<T> Deref for CellReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY:  The lock admits no writer while this guard lives.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> Drop for CellReadGuard<'_, T> {
    fn drop(&mut self) {
        self.cell.lock.release();
    }
}

////////////////////////////////////////// CellWriteGuard //////////////////////////////////////////

/// Exclusive access to the value of an [RwPolicyCell].
pub struct CellWriteGuard<'a, T> {
    cell: &'a RwPolicyCell<T>,
}

impl<T> Deref for CellWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY:  The lock admits nobody else while this guard lives.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> DerefMut for CellWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY:  The lock admits nobody else while this guard lives.
        unsafe { &mut *self.cell.value.get() }
    }
}

impl<T> Drop for CellWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.cell.lock.release();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
