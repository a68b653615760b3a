//! Stream-to-Chunk Adapter (producer side)
//!
//! Output serializer incremental dipotong menjadi chunk berukuran tetap
//! (paling banyak `chunk_size` bytes). Buffer chunk datang dari sink dan
//! dipakai ulang, tidak ada alokasi di hot path.

use tracing::trace;

use crate::base::{Consumer, Producer};

/// Byte stream yang ditulis per span tanpa copy.
pub trait ZeroCopyOutput {
    /// Span kosong berikutnya untuk ditulis, atau `None` jika output ditutup.
    fn next(&mut self) -> Option<&mut [u8]>;

    /// Kembalikan `count` byte terakhir dari span `next` yang tidak terpakai.
    fn back_up(&mut self, count: usize);

    /// Total byte yang sudah ditulis.
    fn byte_count(&self) -> u64;
}

/// Tujuan chunk dari `ChunkOutputStream`.
pub trait ChunkSink {
    /// Buffer kosong untuk diisi, atau `None` jika sink ditutup.
    fn acquire(&mut self) -> Option<Box<[u8]>>;

    /// Serahkan `len` byte pertama dari `buffer`. `false` jika sink ditutup.
    fn emit(&mut self, buffer: Box<[u8]>, len: usize) -> bool;

    /// Tandai end-of-stream. `false` jika sink ditutup.
    fn finish(&mut self) -> bool;
}

/// Entry di queue pull side: chunk terisi atau sentinel.
#[derive(Debug)]
pub enum Pulled {
    Data { buffer: Box<[u8]>, len: usize },
    End,
}

/// Sink ke Bounded Chunk Queue, dengan free list untuk daur ulang buffer.
pub struct QueueSink {
    free: Consumer<Box<[u8]>>,
    filled: Producer<Pulled>,
}

impl QueueSink {
    pub fn new(free: Consumer<Box<[u8]>>, filled: Producer<Pulled>) -> Self {
        Self { free, filled }
    }
}

impl ChunkSink for QueueSink {
    fn acquire(&mut self) -> Option<Box<[u8]>> {
        // Block sampai caller mengembalikan buffer lewat `pull`
        self.free.pop()
    }

    fn emit(&mut self, buffer: Box<[u8]>, len: usize) -> bool {
        self.filled.push(Pulled::Data { buffer, len }).is_ok()
    }

    fn finish(&mut self) -> bool {
        self.filled.push(Pulled::End).is_ok()
    }
}

/// Sink yang mengalokasi buffer baru dan mengumpulkan chunk ke memory.
pub struct CollectingSink {
    chunk_size: usize,
    chunks: Vec<Vec<u8>>,
    finished: bool,
}

impl CollectingSink {
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be positive");
        Self {
            chunk_size,
            chunks: Vec::new(),
            finished: false,
        }
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_chunks(self) -> Vec<Vec<u8>> {
        self.chunks
    }
}

impl ChunkSink for CollectingSink {
    fn acquire(&mut self) -> Option<Box<[u8]>> {
        Some(vec![0u8; self.chunk_size].into_boxed_slice())
    }

    fn emit(&mut self, buffer: Box<[u8]>, len: usize) -> bool {
        self.chunks.push(buffer[..len].to_vec());
        true
    }

    fn finish(&mut self) -> bool {
        self.finished = true;
        true
    }
}

/// Stream-to-Chunk Adapter.
pub struct ChunkOutputStream<K> {
    sink: K,
    current: Option<Box<[u8]>>,
    used: usize,
    // Panjang span dari `next` terakhir
    last_returned: usize,
    byte_count: u64,
    closed: bool,
}

impl<K: ChunkSink> ChunkOutputStream<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            current: None,
            used: 0,
            last_returned: 0,
            byte_count: 0,
            closed: false,
        }
    }

    #[inline]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// `true` jika sink menolak chunk (consumer sudah pergi).
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Kirim chunk yang sedang diisi jika tidak kosong.
    fn flush_current(&mut self) -> bool {
        let used = std::mem::take(&mut self.used);
        match self.current.take() {
            Some(buffer) if used > 0 => {
                trace!(len = used, "chunk emitted");
                if !self.sink.emit(buffer, used) {
                    self.closed = true;
                }
            }
            _ => {}
        }
        !self.closed
    }

    /// Kirim sisa data lalu sentinel. `false` jika sink sudah ditutup.
    pub fn close(&mut self) -> bool {
        self.last_returned = 0;
        if self.closed || !self.flush_current() {
            return false;
        }
        if !self.sink.finish() {
            self.closed = true;
        }
        !self.closed
    }
}

impl<K: ChunkSink> ZeroCopyOutput for ChunkOutputStream<K> {
    fn next(&mut self) -> Option<&mut [u8]> {
        self.last_returned = 0;
        if self.closed {
            return None;
        }

        let has_room = self
            .current
            .as_ref()
            .is_some_and(|buffer| self.used < buffer.len());
        if !has_room {
            if !self.flush_current() {
                return None;
            }
            match self.sink.acquire() {
                Some(buffer) => {
                    assert!(!buffer.is_empty(), "sink returned an empty chunk buffer");
                    self.current = Some(buffer);
                }
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }

        let start = self.used;
        let buffer = self.current.as_mut()?;
        self.used = buffer.len();
        self.last_returned = buffer.len() - start;
        self.byte_count += self.last_returned as u64;
        Some(&mut buffer[start..])
    }

    fn back_up(&mut self, count: usize) {
        assert!(
            count <= self.last_returned,
            "back_up({count}) exceeds the {} bytes returned by the last next()",
            self.last_returned
        );
        self.used -= count;
        self.byte_count -= count as u64;
        self.last_returned = 0;
    }

    #[inline]
    fn byte_count(&self) -> u64 {
        self.byte_count
    }
}

/// Output ke `Vec<u8>` yang tumbuh sesuai kebutuhan.
pub struct VecOutput {
    data: Vec<u8>,
    len: usize,
    last_returned: usize,
}

impl VecOutput {
    const MIN_SPAN: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            len: 0,
            last_returned: 0,
        }
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.len);
        self.data
    }
}

impl Default for VecOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl ZeroCopyOutput for VecOutput {
    fn next(&mut self) -> Option<&mut [u8]> {
        if self.len == self.data.len() {
            let grow = self.data.len().max(Self::MIN_SPAN);
            self.data.resize(self.data.len() + grow, 0);
        }
        let start = self.len;
        self.len = self.data.len();
        self.last_returned = self.len - start;
        Some(&mut self.data[start..])
    }

    fn back_up(&mut self, count: usize) {
        assert!(
            count <= self.last_returned,
            "back_up({count}) exceeds the {} bytes returned by the last next()",
            self.last_returned
        );
        self.len -= count;
        self.last_returned = 0;
    }

    fn byte_count(&self) -> u64 {
        self.len as u64
    }
}
