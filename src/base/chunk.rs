//! Chunk: view non-owning ke byte milik caller
//!
//! Pipeline tidak pernah mengalokasi atau membebaskan memory chunk dari caller.
//! Sinkronisasi lifetime dilakukan lewat `OnRelease`: begitu guard di-drop,
//! caller boleh menimpa atau membebaskan buffer tersebut.

use std::fmt;
use std::slice;

/// View `(ptr, len)` ke byte milik caller.
///
/// Chunk dengan `len == 0` adalah sentinel end-of-stream saat diberikan ke
/// `PushDeserializer::push`.
#[derive(Clone, Copy)]
pub struct Chunk {
    data: *const u8,
    len: usize,
}

// SAFETY: Chunk hanya pointer + panjang. Validitas byte dijamin oleh kontrak
// `push` (caller tidak menyentuh buffer sampai release), bukan oleh tipe ini.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    /// Chunk kosong (sentinel)
    #[inline(always)]
    pub const fn empty() -> Self {
        Self {
            data: std::ptr::NonNull::<u8>::dangling().as_ptr(),
            len: 0,
        }
    }

    /// View ke slice. Tidak ada copy, tidak ada alokasi.
    #[inline(always)]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.as_ptr(),
            len: bytes.len(),
        }
    }

    /// View ke `len` byte mulai dari `data`.
    ///
    /// # Safety
    /// `data` harus valid untuk dibaca sebanyak `len` byte selama chunk dipakai.
    #[inline(always)]
    pub const unsafe fn from_raw_parts(data: *const u8, len: usize) -> Self {
        Self { data, len }
    }

    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub const fn as_ptr(&self) -> *const u8 {
        self.data
    }

    /// Sub-view `[start, end)`.
    ///
    /// # Panics
    /// Panic jika range di luar chunk.
    #[inline(always)]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        assert!(
            start <= end && end <= self.len,
            "chunk range {start}..{end} out of bounds for length {}",
            self.len
        );
        // SAFETY: range sudah dicek terhadap panjang chunk
        Self {
            data: unsafe { self.data.add(start) },
            len: end - start,
        }
    }

    /// Akses byte di balik view.
    ///
    /// # Safety
    /// Buffer caller harus masih hidup dan tidak sedang ditulis selama slice
    /// dipakai. Untuk chunk yang di-push, ini berlaku sampai `OnRelease` jalan.
    #[inline(always)]
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        slice::from_raw_parts(self.data, self.len)
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("data", &self.data)
            .field("len", &self.len)
            .finish()
    }
}

/// Release callback yang dijalankan tepat satu kali, saat guard di-drop.
pub struct OnRelease(Option<Box<dyn FnOnce() + Send>>);

impl OnRelease {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(callback)))
    }

    /// Jalankan callback sekarang (sama dengan drop).
    #[inline]
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for OnRelease {
    fn drop(&mut self) {
        if let Some(callback) = self.0.take() {
            callback();
        }
    }
}

impl fmt::Debug for OnRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OnRelease(..)")
    }
}

/// Unit transfer di dalam queue: chunk + release guard opsional.
///
/// Drop pada value ini adalah titik release.
#[derive(Debug)]
pub struct QueuedChunk {
    chunk: Chunk,
    on_release: Option<OnRelease>,
}

impl QueuedChunk {
    /// # Safety
    /// Byte di balik `chunk` harus valid dan tidak diubah sampai value ini di-drop.
    #[inline]
    pub unsafe fn new(chunk: Chunk, on_release: Option<OnRelease>) -> Self {
        Self { chunk, on_release }
    }

    /// Chunk yang memiliki buffer-nya sendiri. Buffer dibebaskan saat release.
    pub fn owned(bytes: Vec<u8>) -> Self {
        let chunk = Chunk::from_slice(&bytes);
        // Heap buffer milik Vec tidak berpindah walau Vec-nya di-move.
        Self {
            chunk,
            on_release: Some(OnRelease::new(move || drop(bytes))),
        }
    }

    pub fn borrowed_static(bytes: &'static [u8]) -> Self {
        Self {
            chunk: Chunk::from_slice(bytes),
            on_release: None,
        }
    }

    #[inline(always)]
    pub fn chunk(&self) -> Chunk {
        self.chunk
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    /// Byte milik chunk ini.
    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: konstruktor mensyaratkan buffer valid sampai value ini di-drop,
        // dan lifetime slice terikat ke &self.
        unsafe { self.chunk.as_slice() }
    }
}
