//! Chunk-to-Stream Adapter (consumer side)
//!
//! Menyajikan deretan chunk berukuran bebas sebagai satu byte stream logis
//! untuk parser incremental, lengkap dengan back-up dan skip.

use tracing::trace;

use crate::base::{Consumer, QueuedChunk};

/// Byte stream yang dibaca per span tanpa copy.
pub trait ZeroCopyInput {
    /// Span berikutnya yang bisa dibaca, atau `None` jika stream habis.
    fn next(&mut self) -> Option<&[u8]>;

    /// Kembalikan `count` byte terakhir dari span `next` sebelumnya.
    ///
    /// Hanya valid tepat setelah `next`, dengan `count <= ` panjang span itu.
    fn back_up(&mut self, count: usize);

    /// Lompati `count` byte. `false` jika stream habis sebelum itu.
    fn skip(&mut self, count: usize) -> bool;

    /// Total byte yang sudah diserahkan ke parser, dikurangi back-up.
    fn byte_count(&self) -> u64;
}

/// Sumber chunk untuk `ChunkInputStream`.
pub trait ChunkSource {
    /// Chunk berikutnya, atau `None` di end-of-stream.
    fn next_chunk(&mut self) -> Option<QueuedChunk>;
}

/// Entry di queue push side: data atau sentinel.
#[derive(Debug)]
pub enum Pushed {
    Data(QueuedChunk),
    End,
}

/// Sumber chunk dari Bounded Chunk Queue.
pub struct QueueSource {
    consumer: Consumer<Pushed>,
    finished: bool,
    // Producer hilang tanpa mengirim sentinel
    abandoned: bool,
}

impl QueueSource {
    pub fn new(consumer: Consumer<Pushed>) -> Self {
        Self {
            consumer,
            finished: false,
            abandoned: false,
        }
    }

    /// `true` jika producer di-drop sebelum mengirim sentinel.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }
}

impl ChunkSource for QueueSource {
    fn next_chunk(&mut self) -> Option<QueuedChunk> {
        if self.finished {
            return None;
        }
        match self.consumer.pop() {
            Some(Pushed::Data(chunk)) => Some(chunk),
            Some(Pushed::End) => {
                self.finished = true;
                None
            }
            None => {
                self.finished = true;
                self.abandoned = true;
                None
            }
        }
    }
}

/// Sumber chunk dari closure.
pub struct DelegatingSource<F> {
    on_empty: F,
}

impl<F> DelegatingSource<F>
where
    F: FnMut() -> Option<QueuedChunk>,
{
    pub fn new(on_empty: F) -> Self {
        Self { on_empty }
    }
}

impl<F> ChunkSource for DelegatingSource<F>
where
    F: FnMut() -> Option<QueuedChunk>,
{
    fn next_chunk(&mut self) -> Option<QueuedChunk> {
        (self.on_empty)()
    }
}

/// Chunk-to-Stream Adapter.
///
/// Release chunk terjadi saat stream maju melewatinya, yaitu setelah semua
/// byte-nya diserahkan lewat `next` dan sebelum menunggu chunk berikutnya.
pub struct ChunkInputStream<S> {
    source: S,
    current: Option<QueuedChunk>,
    position: usize,
    // Panjang span dari `next` terakhir; 0 jika back-up tidak diizinkan
    last_returned: usize,
    byte_count: u64,
    exhausted: bool,
}

impl<S: ChunkSource> ChunkInputStream<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: None,
            position: 0,
            last_returned: 0,
            byte_count: 0,
            exhausted: false,
        }
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[inline(always)]
    fn remaining_in_current(&self) -> usize {
        self.current
            .as_ref()
            .map_or(0, |chunk| chunk.len() - self.position)
    }

    /// Release chunk yang sudah habis lalu ambil chunk berikutnya.
    /// `false` jika stream habis.
    fn advance(&mut self) -> bool {
        // Drop = release; harus terjadi sebelum block di source
        self.current = None;
        self.position = 0;
        if self.exhausted {
            return false;
        }
        match self.source.next_chunk() {
            Some(chunk) => {
                trace!(len = chunk.len(), "chunk dequeued");
                self.current = Some(chunk);
                true
            }
            None => {
                trace!(byte_count = self.byte_count, "end of stream");
                self.exhausted = true;
                false
            }
        }
    }
}

impl<S: ChunkSource> ZeroCopyInput for ChunkInputStream<S> {
    fn next(&mut self) -> Option<&[u8]> {
        self.last_returned = 0;
        // Chunk kosong di tengah stream bukan sentinel: lewati saja
        while self.remaining_in_current() == 0 {
            if !self.advance() {
                return None;
            }
        }

        let chunk = self.current.as_ref()?;
        let span = &chunk.bytes()[self.position..];
        self.position = chunk.len();
        self.last_returned = span.len();
        self.byte_count += span.len() as u64;
        Some(span)
    }

    fn back_up(&mut self, count: usize) {
        assert!(
            count <= self.last_returned,
            "back_up({count}) exceeds the {} bytes returned by the last next()",
            self.last_returned
        );
        self.position -= count;
        self.byte_count -= count as u64;
        self.last_returned = 0;
    }

    fn skip(&mut self, mut count: usize) -> bool {
        self.last_returned = 0;
        loop {
            let remaining = self.remaining_in_current();
            if count <= remaining {
                self.position += count;
                self.byte_count += count as u64;
                return true;
            }
            self.position += remaining;
            self.byte_count += remaining as u64;
            count -= remaining;
            if !self.advance() {
                return false;
            }
        }
    }

    #[inline]
    fn byte_count(&self) -> u64 {
        self.byte_count
    }
}

/// Stream di atas satu slice, untuk decode dari buffer yang sudah utuh.
pub struct SliceInput<'a> {
    data: &'a [u8],
    position: usize,
    last_returned: usize,
}

impl<'a> SliceInput<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            last_returned: 0,
        }
    }
}

impl ZeroCopyInput for SliceInput<'_> {
    fn next(&mut self) -> Option<&[u8]> {
        self.last_returned = 0;
        if self.position == self.data.len() {
            return None;
        }
        let span = &self.data[self.position..];
        self.position = self.data.len();
        self.last_returned = span.len();
        Some(span)
    }

    fn back_up(&mut self, count: usize) {
        assert!(
            count <= self.last_returned,
            "back_up({count}) exceeds the {} bytes returned by the last next()",
            self.last_returned
        );
        self.position -= count;
        self.last_returned = 0;
    }

    fn skip(&mut self, count: usize) -> bool {
        self.last_returned = 0;
        let remaining = self.data.len() - self.position;
        self.position += count.min(remaining);
        count <= remaining
    }

    fn byte_count(&self) -> u64 {
        self.position as u64
    }
}
