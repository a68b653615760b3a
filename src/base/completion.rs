//! Single-resolution completion: di-resolve tepat sekali, dibaca paling banyak
//! oleh satu waiter.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

enum Slot<T> {
    Pending,
    Resolved(T),
    // Resolver di-drop tanpa nilai (misal stream ditinggalkan)
    Abandoned,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// Membuat pasangan resolver/completion.
pub fn completion<T>() -> (Resolver<T>, Completion<T>) {
    let inner = Arc::new(Inner {
        slot: Mutex::new(Slot::Pending),
        ready: Condvar::new(),
    });
    (
        Resolver {
            inner: Some(inner.clone()),
        },
        Completion { inner },
    )
}

/// Sisi penulis. `resolve` mengonsumsi resolver, jadi hanya bisa dipanggil sekali.
pub struct Resolver<T> {
    inner: Option<Arc<Inner<T>>>,
}

impl<T> Resolver<T> {
    pub fn resolve(mut self, value: T) {
        if let Some(inner) = self.inner.take() {
            *inner.slot.lock() = Slot::Resolved(value);
            inner.ready.notify_all();
        }
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            *inner.slot.lock() = Slot::Abandoned;
            inner.ready.notify_all();
        }
    }
}

/// Sisi pembaca.
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Completion<T> {
    /// Block sampai resolved. `None` jika resolver di-drop tanpa nilai.
    pub fn wait(self) -> Option<T> {
        let mut slot = self.inner.slot.lock();
        while matches!(*slot, Slot::Pending) {
            self.inner.ready.wait(&mut slot);
        }
        Self::take(&mut slot)
    }

    /// Seperti `wait`, dengan batas waktu. `Err(self)` jika masih pending.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Option<T>, Self> {
        let mut slot = self.inner.slot.lock();
        if matches!(*slot, Slot::Pending) {
            self.inner.ready.wait_for(&mut slot, timeout);
        }
        if matches!(*slot, Slot::Pending) {
            drop(slot);
            return Err(self);
        }
        Ok(Self::take(&mut slot))
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(*self.inner.slot.lock(), Slot::Pending)
    }

    fn take(slot: &mut Slot<T>) -> Option<T> {
        match std::mem::replace(slot, Slot::Abandoned) {
            Slot::Resolved(value) => Some(value),
            Slot::Pending | Slot::Abandoned => None,
        }
    }
}
