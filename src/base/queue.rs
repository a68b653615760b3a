//! Bounded Chunk Queue: FIFO berkapasitas tetap dengan backpressure dua arah
//!
//! Data path tetap lock-free lewat `RingBuffer`. Mutex/Condvar hanya dipakai
//! untuk tidur ketika queue penuh (producer) atau kosong (consumer).
//!
//! `bounded` mengembalikan dua half yang tidak bisa di-clone, jadi kontrak
//! single-producer/single-consumer dari ring buffer dijamin oleh tipe.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::ring_buffer::RingBuffer;

struct Shared<T> {
    ring: RingBuffer<T>,
    lock: Mutex<()>,
    not_full: Condvar,
    not_empty: Condvar,
    // Producer sudah di-drop: tidak akan ada data baru
    producer_gone: AtomicBool,
    // Consumer sudah di-drop: push tidak akan pernah dibaca
    consumer_gone: AtomicBool,
}

impl<T> Shared<T> {
    #[inline]
    fn wake(&self, condvar: &Condvar) {
        // Lock diambil setelah perubahan state supaya waiter yang sedang
        // mengecek kondisi tidak kehilangan notifikasi.
        drop(self.lock.lock());
        condvar.notify_one();
    }
}

/// Error dari `Producer::push` ketika consumer sudah tidak ada.
/// Value dikembalikan ke pemanggil.
pub struct Disconnected<T>(pub T);

impl<T> fmt::Debug for Disconnected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Disconnected(..)")
    }
}

impl<T> fmt::Display for Disconnected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue consumer disconnected")
    }
}

/// Membuat queue dengan kapasitas `capacity` (>= 1).
///
/// # Panics
/// Panic jika `capacity == 0`
pub fn bounded<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let shared = Arc::new(Shared {
        ring: RingBuffer::new(capacity),
        lock: Mutex::new(()),
        not_full: Condvar::new(),
        not_empty: Condvar::new(),
        producer_gone: AtomicBool::new(false),
        consumer_gone: AtomicBool::new(false),
    });
    (
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    )
}

/// Sisi enqueue. Hanya satu per queue.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Producer<T> {
    /// Enqueue `value`, block selama queue penuh.
    pub fn push(&mut self, mut value: T) -> Result<(), Disconnected<T>> {
        let shared = &*self.shared;
        loop {
            if shared.consumer_gone.load(Ordering::Acquire) {
                return Err(Disconnected(value));
            }
            match shared.ring.push(value) {
                Ok(()) => {
                    shared.wake(&shared.not_empty);
                    return Ok(());
                }
                Err(rejected) => value = rejected,
            }

            let mut guard = shared.lock.lock();
            // Cek ulang di bawah lock sebelum tidur
            if shared.ring.is_full() && !shared.consumer_gone.load(Ordering::Acquire) {
                shared.not_full.wait(&mut guard);
            }
        }
    }

    /// Enqueue tanpa block. Mengembalikan value jika penuh atau consumer hilang.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        if self.shared.consumer_gone.load(Ordering::Acquire) {
            return Err(value);
        }
        self.shared.ring.push(value)?;
        self.shared.wake(&self.shared.not_empty);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.ring.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.shared.producer_gone.store(true, Ordering::Release);
        self.shared.wake(&self.shared.not_empty);
    }
}

/// Sisi dequeue. Hanya satu per queue.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Consumer<T> {
    /// Dequeue head, block selama queue kosong.
    ///
    /// Mengembalikan `None` setelah producer di-drop dan semua data habis.
    pub fn pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        loop {
            if let Some(value) = shared.ring.pop() {
                shared.wake(&shared.not_full);
                return Some(value);
            }
            if shared.producer_gone.load(Ordering::Acquire) {
                // Push terakhir bisa terjadi tepat sebelum flag di-set
                return shared.ring.pop();
            }

            let mut guard = shared.lock.lock();
            if shared.ring.is_empty() && !shared.producer_gone.load(Ordering::Acquire) {
                shared.not_empty.wait(&mut guard);
            }
        }
    }

    /// Dequeue tanpa block.
    pub fn try_pop(&mut self) -> Option<T> {
        let value = self.shared.ring.pop()?;
        self.shared.wake(&self.shared.not_full);
        Some(value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.ring.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.shared.consumer_gone.store(true, Ordering::Release);
        // Drain supaya release guard yang masih antre langsung jalan
        while self.shared.ring.pop().is_some() {}
        self.shared.wake(&self.shared.not_full);
    }
}
