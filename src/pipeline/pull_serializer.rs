//! PullSerializer: serialize incremental, diambil caller per chunk
//!
//! ```text
//! Message::encode -> ChunkOutputStream -> Bounded Chunk Queue -> pull() -> caller
//! ```
//!
//! Semua buffer chunk (`number_of_chunks + 1`) dialokasi sekali saat `start`
//! lalu didaur ulang lewat free list.

use std::any::type_name;
use std::sync::Arc;

use tracing::{debug, error, trace};

use super::worker::{Outcome, State, Worker};
use crate::base::{bounded, Consumer, Producer};
use crate::config::PipelineConfig;
use crate::error::WireError;
use crate::protocol::{write_message, Message};
use crate::stream::{ChunkOutputStream, Pulled, QueueSink, ZeroCopyOutput};

/// Serializer dengan memory terbatas.
///
/// Konvensi ownership: slice dari `pull` milik caller sampai `pull`
/// berikutnya; borrow checker menegakkan ini karena `pull` meminjam `&mut self`.
pub struct PullSerializer {
    config: PipelineConfig,
    state: State,
    filled: Option<Consumer<Pulled>>,
    free: Option<Producer<Box<[u8]>>>,
    // Buffer yang sedang dipegang caller
    held: Option<Box<[u8]>>,
    worker: Option<Worker>,
}

impl PullSerializer {
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
            filled: None,
            free: None,
            held: None,
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

    /// Mulai serialize `message` di worker thread.
    ///
    /// Caller tetap boleh membaca `message` lewat `Arc` lain; mutasi tidak
    /// mungkin selama worker memegangnya.
    ///
    /// # Panics
    /// Panic jika dipanggil lebih dari sekali
    pub fn start<M>(&mut self, message: Arc<M>)
    where
        M: Message + Send + Sync + 'static,
    {
        assert!(
            self.state == State::NotStarted,
            "start called on a pull serializer in state {:?}",
            self.state
        );

        let buffers = self.config.number_of_chunks + 1;
        let (mut free_tx, free_rx) = bounded::<Box<[u8]>>(buffers);
        for _ in 0..buffers {
            let buffer = vec![0u8; self.config.chunk_size].into_boxed_slice();
            if free_tx.try_push(buffer).is_err() {
                unreachable!("free list sized for every buffer");
            }
        }
        let (filled_tx, filled_rx) = bounded(self.config.number_of_chunks);

        let worker = Worker::spawn("pull-serializer", move || {
            let mut output = ChunkOutputStream::new(QueueSink::new(free_rx, filled_tx));
            match write_message(&*message, &mut output) {
                Ok(total) => debug!(bytes = total, "message serialized"),
                Err(WireError::Closed) => {
                    debug!(bytes = output.byte_count(), "serializer abandoned");
                    return Outcome::Abandoned;
                }
                Err(err) => {
                    error!(%err, bytes = output.byte_count(), "serialization failed");
                    panic!("failed to serialize {}: {err}", type_name::<M>());
                }
            }
            if !output.close() {
                debug!("serializer abandoned before end of stream");
                return Outcome::Abandoned;
            }
            Outcome::Completed
        });

        self.filled = Some(filled_rx);
        self.free = Some(free_tx);
        self.worker = Some(worker);
        self.state = State::Running;
    }

    /// Chunk berikutnya (paling banyak `chunk_size` bytes), block sampai siap.
    ///
    /// Slice kosong adalah sentinel dan dikembalikan tepat sekali.
    ///
    /// # Panics
    /// Panic jika belum `start`, setelah sentinel, atau jika worker gagal.
    pub fn pull(&mut self) -> &[u8] {
        match self.state {
            State::Running => {}
            State::NotStarted => panic!("pull called before start"),
            State::Draining | State::Done => panic!("pull called after end of stream"),
        }

        // Chunk sebelumnya kembali ke worker
        if let (Some(buffer), Some(free)) = (self.held.take(), self.free.as_mut()) {
            // Gagal hanya jika worker sudah pergi; buffer cukup dibuang
            let _ = free.try_push(buffer);
        }

        let Some(filled) = self.filled.as_mut() else {
            unreachable!("running pull serializer without a queue");
        };
        match filled.pop() {
            Some(Pulled::Data { buffer, len }) => {
                trace!(len, "chunk pulled");
                &self.held.insert(buffer)[..len]
            }
            Some(Pulled::End) => {
                trace!("end of stream pulled");
                self.state = State::Draining;
                &[]
            }
            None => self.fail(),
        }
    }

    fn fail(&mut self) -> ! {
        self.shutdown();
        panic!("pull serializer worker stopped before end of stream");
    }

    /// Tunggu worker selesai. Sebelum sentinel, serialisasi dihentikan.
    pub fn finish(&mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Consumer dulu supaya worker yang tertahan di push terbangun
        self.filled = None;
        self.free = None;
        self.held = None;
        if let Some(mut worker) = self.worker.take() {
            worker.join();
        }
        self.state = State::Done;
    }
}

impl Drop for PullSerializer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
