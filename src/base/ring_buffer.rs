//! Lock-Free Single-Producer Single-Consumer (SPSC) Ring Buffer
//!
//! Implementasi menggunakan Lamport Queue dengan memory ordering yang tepat.
//! Kapasitas logis ditentukan saat runtime (`number_of_chunks`), storage
//! dibulatkan ke power of 2 supaya index tetap bisa di-mask.
//! Tidak ada alokasi setelah inisialisasi.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Slot dalam ring buffer
#[repr(C, align(64))] // Cache line alignment untuk menghindari false sharing
struct Slot<T> {
    data: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    const fn new() -> Self {
        Self {
            data: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
struct CacheLinePadded<T> {
    value: T,
}

impl<T> CacheLinePadded<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

/// Lock-Free SPSC Ring Buffer
///
/// Head dan tail berada di cache line terpisah untuk menghindari false
/// sharing antara producer dan consumer. Pemanggil wajib menjamin hanya ada
/// satu producer dan satu consumer; `queue::bounded` menegakkan ini lewat tipe.
#[repr(C)]
pub(crate) struct RingBuffer<T> {
    // Producer side
    head: CacheLinePadded<AtomicUsize>,
    // Consumer side
    tail: CacheLinePadded<AtomicUsize>,
    buffer: Box<[Slot<T>]>,
    mask: usize,
    capacity: usize,
}

// SAFETY: RingBuffer aman untuk Send/Sync karena:
// - Hanya satu producer (menulis head)
// - Hanya satu consumer (menulis tail)
// - Atomic operations menjamin visibility
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Membuat ring buffer dengan kapasitas logis `capacity`.
    ///
    /// # Panics
    /// Panic jika `capacity == 0`
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");

        let slots = capacity.next_power_of_two();
        let mut buffer = Vec::with_capacity(slots);
        for _ in 0..slots {
            buffer.push(Slot::new());
        }

        Self {
            head: CacheLinePadded::new(AtomicUsize::new(0)),
            tail: CacheLinePadded::new(AtomicUsize::new(0)),
            buffer: buffer.into_boxed_slice(),
            mask: slots - 1,
            capacity,
        }
    }

    /// Push data ke buffer (Producer side)
    ///
    /// Mengembalikan value-nya lagi jika buffer penuh.
    #[inline(always)]
    pub fn push(&self, value: T) -> Result<(), T> {
        let head = self.head.value.load(Ordering::Relaxed);
        let tail = self.tail.value.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= self.capacity {
            return Err(value);
        }

        let slot = &self.buffer[head & self.mask];

        // SAFETY: slot ini sudah di-pop (atau belum pernah dipakai) oleh consumer
        unsafe {
            (*slot.data.get()).write(value);
        }

        // Release: write di atas visible sebelum head di-update
        self.head
            .value
            .store(head.wrapping_add(1), Ordering::Release);

        Ok(())
    }

    /// Pop data dari buffer (Consumer side)
    #[inline(always)]
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.value.load(Ordering::Relaxed);
        let head = self.head.value.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let slot = &self.buffer[tail & self.mask];

        // SAFETY: slot sudah ditulis producer dan value-nya di-move keluar tepat sekali
        let value = unsafe { (*slot.data.get()).assume_init_read() };

        // Release: read di atas selesai sebelum slot boleh ditulis ulang
        self.tail
            .value
            .store(tail.wrapping_add(1), Ordering::Release);

        Some(value)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Jumlah elemen dalam buffer
    #[inline(always)]
    pub fn len(&self) -> usize {
        let tail = self.tail.value.load(Ordering::Acquire);
        let head = self.head.value.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// Kapasitas logis buffer
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // Value yang masih tertinggal harus di-drop (misal release guard)
        while self.pop().is_some() {}
    }
}
