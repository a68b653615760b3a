//! PushDeserializer: parse incremental dari chunk yang di-push caller
//!
//! ```text
//! push(chunk) -> Bounded Chunk Queue -> ChunkInputStream -> Message::decode -> on_done
//! ```
//!
//! Caller hanya berinteraksi lewat `start`/`push`; parse berjalan di worker.

use std::any::type_name;

use tracing::{debug, error, trace};

use super::worker::{Outcome, State, Worker};
use crate::base::{
    bounded, completion, Chunk, Completion, Disconnected, OnRelease, Producer, QueuedChunk,
};
use crate::config::PipelineConfig;
use crate::protocol::{read_message, Message};
use crate::stream::{ChunkInputStream, Pushed, QueueSource, ZeroCopyInput};

/// Deserializer dengan memory terbatas: paling banyak `number_of_chunks`
/// potongan (masing-masing <= `chunk_size` bytes) yang menunggu di queue.
pub struct PushDeserializer {
    config: PipelineConfig,
    state: State,
    producer: Option<Producer<Pushed>>,
    worker: Option<Worker>,
}

impl PushDeserializer {
    /// # Panics
    /// Panic jika `chunk_size` atau `number_of_chunks` nol
    pub fn new(chunk_size: usize, number_of_chunks: usize) -> Self {
        match PipelineConfig::new(chunk_size, number_of_chunks) {
            Ok(config) => Self::from_config(config),
            Err(e) => panic!("invalid pipeline config: {e}"),
        }
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        if let Err(e) = config.validate() {
            panic!("invalid pipeline config: {e}");
        }
        Self {
            config,
            state: State::NotStarted,
            producer: None,
            worker: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Mulai parse ke `message` (harus masih kosong) di worker thread.
    ///
    /// `on_done` dipanggil tepat sekali dari worker setelah sentinel diterima
    /// dan message valid. Byte yang tidak bisa di-parse membuat worker panic
    /// dengan `failed to parse`; panic itu muncul lagi di thread caller pada
    /// `push`, `finish`, atau drop berikutnya.
    ///
    /// # Panics
    /// Panic jika dipanggil lebih dari sekali
    pub fn start<M, F>(&mut self, message: M, on_done: F)
    where
        M: Message + Send + 'static,
        F: FnOnce(M) + Send + 'static,
    {
        assert!(
            self.state == State::NotStarted,
            "start called on a push deserializer in state {:?}",
            self.state
        );

        let (producer, consumer) = bounded(self.config.number_of_chunks);
        let worker = Worker::spawn("push-deserializer", move || {
            let mut message = message;
            let mut input = ChunkInputStream::new(QueueSource::new(consumer));
            let result = read_message(&mut message, &mut input);

            if input.source().is_abandoned() {
                debug!(bytes = input.byte_count(), "stream abandoned before end of stream");
                return Outcome::Abandoned;
            }
            if let Err(err) = result {
                error!(%err, bytes = input.byte_count(), "deserialization failed");
                panic!("failed to parse {}: {err}", type_name::<M>());
            }

            debug!(bytes = input.byte_count(), "message parsed");
            drop(input);
            on_done(message);
            Outcome::Completed
        });

        self.producer = Some(producer);
        self.worker = Some(worker);
        self.state = State::Running;
    }

    /// `start` dengan completion berbentuk promise, bukan callback.
    ///
    /// `Completion::wait` mengembalikan `None` jika stream ditinggalkan.
    pub fn start_deferred<M>(&mut self, message: M) -> Completion<M>
    where
        M: Message + Send + 'static,
    {
        let (resolver, completion) = completion();
        self.start(message, move |message| resolver.resolve(message));
        completion
    }

    /// Push satu chunk. Chunk kosong adalah sentinel end-of-stream dan harus
    /// menjadi push terakhir.
    ///
    /// Chunk dipotong per `chunk_size` bytes; `on_release` dijalankan oleh
    /// worker setelah byte terakhir chunk ini dibaca parser. Untuk sentinel,
    /// `on_release` dijalankan sebelum `push` kembali.
    ///
    /// # Safety
    /// Byte di balik `chunk` harus tetap valid dan tidak diubah sampai
    /// `on_release` jalan, atau sampai `finish`/drop kembali jika `on_release`
    /// adalah `None`.
    ///
    /// # Panics
    /// Panic jika belum `start`, jika sentinel sudah di-push, atau jika worker
    /// gagal parse.
    pub unsafe fn push(&mut self, chunk: Chunk, on_release: Option<OnRelease>) {
        match self.state {
            State::Running => {}
            State::NotStarted => panic!("push called before start"),
            State::Draining | State::Done => panic!("push called after end of stream"),
        }

        if chunk.is_empty() {
            trace!("end of stream pushed");
            // Tidak ada byte yang perlu dibaca
            drop(on_release);
            self.enqueue(Pushed::End);
            self.state = State::Draining;
            return;
        }

        trace!(len = chunk.len(), "chunk pushed");
        let mut on_release = on_release;
        let mut start = 0;
        while start < chunk.len() {
            let end = (start + self.config.chunk_size).min(chunk.len());
            // Release ikut potongan terakhir: dibaca paling akhir
            let release = if end == chunk.len() {
                on_release.take()
            } else {
                None
            };
            // SAFETY: kontrak `push` menjamin byte valid sampai release
            let piece = unsafe { QueuedChunk::new(chunk.slice(start, end), release) };
            self.enqueue(Pushed::Data(piece));
            start = end;
        }
    }

    /// Push buffer milik sendiri; buffer dibebaskan setelah selesai dibaca.
    /// Buffer kosong berarti end-of-stream, sama seperti `push`.
    pub fn push_owned(&mut self, bytes: Vec<u8>) {
        let chunk = Chunk::from_slice(&bytes);
        let release = OnRelease::new(move || drop(bytes));
        // SAFETY: buffer hidup di dalam release guard sampai guard jalan
        unsafe { self.push(chunk, Some(release)) }
    }

    pub fn push_static(&mut self, bytes: &'static [u8]) {
        // SAFETY: 'static dan immutable
        unsafe { self.push(Chunk::from_slice(bytes), None) }
    }

    /// Push sentinel
    pub fn end_of_stream(&mut self) {
        // SAFETY: chunk kosong tidak menunjuk ke byte apapun
        unsafe { self.push(Chunk::empty(), None) }
    }

    fn enqueue(&mut self, entry: Pushed) {
        let Some(producer) = self.producer.as_mut() else {
            unreachable!("running push deserializer without a queue");
        };
        if let Err(Disconnected(entry)) = producer.push(entry) {
            // Worker sudah berhenti dan tidak akan membaca chunk ini
            drop(entry);
            self.fail();
        }
    }

    fn fail(&mut self) -> ! {
        self.shutdown();
        panic!("push deserializer worker stopped before end of stream");
    }

    /// Tunggu worker selesai setelah sentinel di-push.
    ///
    /// # Panics
    /// Panic jika sentinel belum di-push, atau jika parse gagal.
    pub fn finish(&mut self) {
        match self.state {
            State::Running => panic!("finish called before end of stream"),
            State::NotStarted | State::Draining | State::Done => self.shutdown(),
        }
    }

    fn shutdown(&mut self) {
        // Tanpa sentinel, ini membuat worker berhenti sebagai abandoned
        self.producer = None;
        if let Some(mut worker) = self.worker.take() {
            worker.join();
        }
        self.state = State::Done;
    }
}

impl Drop for PushDeserializer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{to_vec, varint_len, FrameHeader, Trajectory, SAMPLE_SIZE};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_owned_chunks_roundtrip() {
        let expected = Trajectory::generate("owned", 50);
        let bytes = to_vec(&expected).unwrap();

        let mut deserializer = PushDeserializer::new(64, 2);
        let completion = deserializer.start_deferred(Trajectory::default());
        for piece in bytes.chunks(100) {
            deserializer.push_owned(piece.to_vec());
        }
        deserializer.end_of_stream();
        deserializer.finish();

        assert_eq!(deserializer.state(), State::Done);
        assert_eq!(completion.wait(), Some(expected));
    }

    #[test]
    fn test_release_order_follows_push_order() {
        let bytes = to_vec(&Trajectory::generate("order", 20)).unwrap();
        let released = Arc::new(Mutex::new(Vec::new()));

        let mut deserializer = PushDeserializer::new(16, 3);
        deserializer.start(Trajectory::default(), |_| {});
        for (index, piece) in bytes.chunks(50).enumerate() {
            let released = released.clone();
            let release = OnRelease::new(move || released.lock().unwrap().push(index));
            unsafe { deserializer.push(Chunk::from_slice(piece), Some(release)) };
        }
        deserializer.end_of_stream();
        deserializer.finish();

        let count = bytes.chunks(50).count();
        assert_eq!(*released.lock().unwrap(), (0..count).collect::<Vec<_>>());
    }

    #[test]
    fn test_sentinel_release_fires_before_push_returns() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let mut deserializer = PushDeserializer::new(16, 1);
        deserializer.start(Trajectory::default(), |_| {});
        for piece in to_vec(&Trajectory::default()).unwrap().chunks(7) {
            deserializer.push_owned(piece.to_vec());
        }
        unsafe {
            deserializer.push(
                Chunk::empty(),
                Some(OnRelease::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
        };
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(deserializer.state(), State::Draining);
    }

    #[test]
    #[should_panic(expected = "push called before start")]
    fn test_push_before_start_panics() {
        let mut deserializer = PushDeserializer::new(16, 1);
        deserializer.push_static(b"abc");
    }

    #[test]
    #[should_panic(expected = "push called after end of stream")]
    fn test_push_after_sentinel_panics() {
        let mut deserializer = PushDeserializer::new(16, 1);
        deserializer.start(Trajectory::default(), |_| {});
        for piece in to_vec(&Trajectory::default()).unwrap().chunks(7) {
            deserializer.push_owned(piece.to_vec());
        }
        deserializer.end_of_stream();
        deserializer.end_of_stream();
    }

    #[test]
    #[should_panic(expected = "start called")]
    fn test_start_twice_panics() {
        let mut deserializer = PushDeserializer::new(16, 1);
        deserializer.start(Trajectory::default(), |_| {});
        deserializer.start(Trajectory::default(), |_| {});
    }

    #[test]
    #[should_panic(expected = "invalid pipeline config")]
    fn test_zero_capacity_rejected() {
        PushDeserializer::new(16, 0);
    }

    #[test]
    #[should_panic(expected = "failed to parse")]
    fn test_garbage_is_fatal() {
        let mut deserializer = PushDeserializer::new(16, 2);
        deserializer.start(Trajectory::default(), |_| {});
        deserializer.push_static(b"definitely not a frame");
        deserializer.end_of_stream();
        deserializer.finish();
    }

    #[test]
    #[should_panic(expected = "failed to parse")]
    fn test_worker_failure_surfaces_at_push() {
        let mut deserializer = PushDeserializer::new(8, 1);
        deserializer.start(Trajectory::default(), |_| {});
        // Worker mati setelah header; queue putus dan push berikutnya panic
        for _ in 0..1000 {
            deserializer.push_static(b"garbage!garbage!");
        }
        unreachable!("push kept succeeding after the worker failed");
    }

    #[test]
    #[should_panic(expected = "failed to parse")]
    fn test_oversized_length_is_fatal_not_oom() {
        // Magic valid, count 2^44 sample cocok dengan payload_len, tanpa sample
        let count: u64 = 1 << 44;
        let header = FrameHeader::new(1 + varint_len(count) + count * SAMPLE_SIZE);
        let mut frame = header.to_bytes().to_vec();
        frame.push(0);
        frame.extend_from_slice(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x04]);

        let mut deserializer = PushDeserializer::new(64, 2);
        deserializer.start(Trajectory::default(), |_| {});
        deserializer.push_owned(frame);
        deserializer.end_of_stream();
        deserializer.finish();
    }

    #[test]
    fn test_drop_before_sentinel_abandons_without_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let bytes = to_vec(&Trajectory::generate("partial", 30)).unwrap();

        let mut deserializer = PushDeserializer::new(32, 2);
        deserializer.start(Trajectory::default(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        deserializer.push_owned(bytes[..bytes.len() / 2].to_vec());
        drop(deserializer);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
