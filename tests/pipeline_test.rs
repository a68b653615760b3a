//! Pipeline Test - serializer/deserializer end-to-end
//!
//! Menjalankan kedua arah pipeline di atas thread sungguhan: chunk di-stomp
//! begitu release callback jalan, jadi pembacaan setelah release pasti
//! ketahuan sebagai message rusak.
//!
//! Usage:
//!   cargo test --release --test pipeline_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chunkstream::protocol::to_vec;
use chunkstream::{
    Chunk, MmapStorage, OnRelease, PullSerializer, PushDeserializer, State, Trajectory,
};
use proptest::prelude::*;

const STOMP: u8 = 0xCD;

/// Pointer ke buffer test yang boleh dibawa ke worker thread
struct SharedBytes(*mut u8);

unsafe impl Send for SharedBytes {}

impl SharedBytes {
    /// Timpa `len` byte; setiap byte pasti berubah nilainya
    unsafe fn stomp(&self, len: usize) {
        for i in 0..len {
            let byte = self.0.add(i);
            *byte = !*byte;
        }
    }

    /// Timpa lalu bebaskan buffer hasil `Box::into_raw`
    unsafe fn stomp_and_free(self, len: usize) {
        std::ptr::write_bytes(self.0, STOMP, len);
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.0, len)));
    }
}

fn pull_all(serializer: &mut PullSerializer) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    loop {
        let chunk = serializer.pull();
        if chunk.is_empty() {
            break;
        }
        chunks.push(chunk.to_vec());
    }
    chunks
}

#[test]
fn test_serialization_matches_single_buffer_encoding() {
    let trajectory = Arc::new(Trajectory::generate("serialize", 300));
    let expected = to_vec(&*trajectory).unwrap();

    for &(chunk_size, number_of_chunks) in &[(1, 1), (77, 3), (1024, 2), (64 * 1024, 8)] {
        let mut serializer = PullSerializer::new(chunk_size, number_of_chunks);
        serializer.start(Arc::clone(&trajectory));
        let chunks = pull_all(&mut serializer);
        serializer.finish();

        // Semua chunk penuh kecuali yang terakhir
        let (last, full) = chunks.split_last().unwrap();
        assert!(full.iter().all(|c| c.len() == chunk_size));
        assert!(!last.is_empty() && last.len() <= chunk_size);
        assert_eq!(chunks.concat(), expected, "chunk_size={chunk_size}");
        assert_eq!(serializer.state(), State::Done);
    }
}

#[test]
fn test_deserialization_threading() {
    let trajectory = Trajectory::generate("threading", 1_000);
    let bytes = to_vec(&trajectory).unwrap();
    let released = Arc::new(AtomicUsize::new(0));

    let mut deserializer = PushDeserializer::new(100, 4);
    let completion = deserializer.start_deferred(Trajectory::default());

    let mut pushed = 0;
    for piece in bytes.chunks(333) {
        let buffer = Box::into_raw(piece.to_vec().into_boxed_slice());
        let len = piece.len();
        let shared = SharedBytes(buffer as *mut u8);
        let released = Arc::clone(&released);
        // SAFETY: buffer dibebaskan hanya oleh release callback
        unsafe {
            deserializer.push(
                Chunk::from_raw_parts(buffer as *const u8, len),
                Some(OnRelease::new(move || {
                    shared.stomp_and_free(len);
                    released.fetch_add(1, Ordering::SeqCst);
                })),
            );
        }
        pushed += 1;
    }
    deserializer.end_of_stream();
    assert_eq!(deserializer.state(), State::Draining);
    deserializer.finish();

    assert_eq!(released.load(Ordering::SeqCst), pushed);
    assert_eq!(completion.wait(), Some(trajectory));
}

#[test]
fn test_serialization_deserialization_chained() {
    let trajectory = Arc::new(Trajectory::generate("chained", 2_000));

    for &(chunk_size, number_of_chunks) in &[(13, 1), (77, 4), (4096, 2)] {
        let mut serializer = PullSerializer::new(chunk_size, number_of_chunks);
        let mut deserializer = PushDeserializer::new(chunk_size, number_of_chunks);
        serializer.start(Arc::clone(&trajectory));

        let done = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&done);
        deserializer.start(Trajectory::default(), move |message| {
            *slot.lock().unwrap() = Some(message);
        });

        loop {
            let chunk = serializer.pull();
            if chunk.is_empty() {
                deserializer.end_of_stream();
                break;
            }
            // Copy ke storage sendiri, di-stomp begitu deserializer selesai
            let len = chunk.len();
            let storage = Box::into_raw(chunk.to_vec().into_boxed_slice());
            let shared = SharedBytes(storage as *mut u8);
            // SAFETY: storage dibebaskan hanya oleh release callback
            unsafe {
                deserializer.push(
                    Chunk::from_raw_parts(storage as *const u8, len),
                    Some(OnRelease::new(move || shared.stomp_and_free(len))),
                );
            }
        }
        serializer.finish();
        deserializer.finish();

        let decoded = done.lock().unwrap().take();
        assert_eq!(decoded.as_ref(), Some(&*trajectory), "chunk_size={chunk_size}");
    }
}

#[test]
#[should_panic(expected = "failed to parse")]
fn test_stomp_one_extra_byte_is_detected() {
    const CHUNK_SIZE: usize = 77;
    let bytes = to_vec(&Trajectory::generate("stomp", 500)).unwrap();

    // Satu byte slack di akhir supaya stomp chunk terakhir tetap di dalam buffer
    let mut buffer = bytes.clone();
    buffer.push(0);
    let base = buffer.as_mut_ptr();

    let mut deserializer = PushDeserializer::new(CHUNK_SIZE, 2);
    deserializer.start(Trajectory::default(), |_| {});

    let mut start = 0;
    while start < bytes.len() {
        let len = CHUNK_SIZE.min(bytes.len() - start);
        // SAFETY: `buffer` tidak disentuh lewat reference sampai deserializer
        // selesai, dan di-drop setelahnya.
        unsafe {
            let shared = SharedBytes(base.add(start));
            // Release menimpa satu byte lebih: byte pertama chunk berikutnya
            deserializer.push(
                Chunk::from_raw_parts(base.add(start), len),
                Some(OnRelease::new(move || shared.stomp(len + 1))),
            );
        }
        start += len;
    }
    deserializer.end_of_stream();
    deserializer.finish();
}

#[test]
fn test_push_backpressure_is_bounded() {
    const NUMBER_OF_CHUNKS: usize = 2;
    let bytes = to_vec(&Trajectory::generate("bounded", 2_000)).unwrap();
    let outstanding = Arc::new(AtomicUsize::new(0));
    let mut peak = 0;

    let mut deserializer = PushDeserializer::new(64, NUMBER_OF_CHUNKS);
    let completion = deserializer.start_deferred(Trajectory::default());
    for piece in bytes.chunks(64) {
        let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        peak = peak.max(now);
        let outstanding = Arc::clone(&outstanding);
        let piece = piece.to_vec();
        let chunk = Chunk::from_slice(&piece);
        // SAFETY: `piece` pindah ke dalam release guard
        unsafe {
            deserializer.push(
                chunk,
                Some(OnRelease::new(move || {
                    drop(piece);
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                })),
            );
        }
    }
    deserializer.end_of_stream();
    deserializer.finish();

    // Queue penuh + satu chunk dibaca worker + satu chunk sedang di-push
    assert!(peak <= NUMBER_OF_CHUNKS + 2, "peak outstanding {peak}");
    assert_eq!(outstanding.load(Ordering::SeqCst), 0);
    assert!(completion.wait().is_some());
}

#[test]
fn test_push_blocks_while_worker_stalls_on_release() {
    const NUMBER_OF_CHUNKS: usize = 1;
    let trajectory = Trajectory::generate("stall", 50);
    let bytes = to_vec(&trajectory).unwrap();
    let pieces: Vec<Vec<u8>> = bytes.chunks(64).map(<[u8]>::to_vec).collect();
    assert!(pieces.len() > NUMBER_OF_CHUNKS + 2);

    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let pushed = Arc::new(AtomicUsize::new(0));

    let mut deserializer = PushDeserializer::new(64, NUMBER_OF_CHUNKS);
    let completion = deserializer.start_deferred(Trajectory::default());

    let counter = Arc::clone(&pushed);
    let pusher = thread::spawn(move || {
        let mut pieces = pieces.into_iter();
        let first = pieces.next().unwrap();
        let chunk = Chunk::from_slice(&first);
        // SAFETY: `first` pindah ke release guard; worker tertahan di sana
        // sampai gate dibuka
        unsafe {
            deserializer.push(
                chunk,
                Some(OnRelease::new(move || {
                    let _ = gate_rx.recv();
                    drop(first);
                })),
            );
        }
        counter.fetch_add(1, Ordering::SeqCst);
        for piece in pieces {
            deserializer.push_owned(piece);
            counter.fetch_add(1, Ordering::SeqCst);
        }
        deserializer.end_of_stream();
        deserializer.finish();
    });

    // Chunk pertama tertahan di release, chunk kedua mengisi queue
    let deadline = Instant::now() + Duration::from_secs(5);
    while pushed.load(Ordering::SeqCst) < NUMBER_OF_CHUNKS + 1 {
        assert!(Instant::now() < deadline, "pushes never reached the queue bound");
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pushed.load(Ordering::SeqCst), NUMBER_OF_CHUNKS + 1);

    gate_tx.send(()).unwrap();
    pusher.join().unwrap();
    assert_eq!(completion.wait(), Some(trajectory));
}

#[test]
fn test_early_drop_abandons_both_sides() {
    let trajectory = Arc::new(Trajectory::generate("abandon", 10_000));
    let called = Arc::new(AtomicUsize::new(0));

    let mut serializer = PullSerializer::new(256, 2);
    let mut deserializer = PushDeserializer::new(256, 2);
    serializer.start(Arc::clone(&trajectory));
    let flag = Arc::clone(&called);
    deserializer.start(Trajectory::default(), move |_| {
        flag.fetch_add(1, Ordering::SeqCst);
    });

    for _ in 0..3 {
        let chunk = serializer.pull().to_vec();
        deserializer.push_owned(chunk);
    }
    drop(serializer);
    drop(deserializer);

    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[test]
fn test_finish_is_idempotent() {
    let trajectory = Arc::new(Trajectory::generate("idempotent", 10));

    let mut serializer = PullSerializer::new(32, 1);
    serializer.start(Arc::clone(&trajectory));
    let chunks = pull_all(&mut serializer);
    serializer.finish();
    serializer.finish();
    assert_eq!(serializer.state(), State::Done);

    let mut deserializer = PushDeserializer::new(32, 1);
    let completion = deserializer.start_deferred(Trajectory::default());
    for chunk in chunks {
        deserializer.push_owned(chunk);
    }
    deserializer.end_of_stream();
    deserializer.finish();
    deserializer.finish();
    assert_eq!(deserializer.state(), State::Done);
    assert_eq!(completion.wait().as_ref(), Some(&*trajectory));
}

#[test]
fn test_mmap_storage_roundtrip() {
    let path = std::env::temp_dir()
        .join(format!("chunkstream_pipeline_{}.chks", std::process::id()));
    let trajectory = Arc::new(Trajectory::generate("mmap", 3_000));
    let frame = to_vec(&*trajectory).unwrap();

    {
        let mut storage = MmapStorage::create(&path, frame.len()).unwrap();
        let mut serializer = PullSerializer::new(512, 4);
        serializer.start(Arc::clone(&trajectory));
        for chunk in pull_all(&mut serializer) {
            assert!(storage.append(&chunk).is_some());
        }
        serializer.finish();
        storage.flush().unwrap();
        assert_eq!(storage.len(), frame.len());
    }

    let storage = MmapStorage::open(&path).unwrap();
    let mut deserializer = PushDeserializer::new(1000, 3);
    let completion = deserializer.start_deferred(Trajectory::default());
    for piece in storage.chunks(4096) {
        // SAFETY: storage hidup lebih lama dari deserializer (finish di bawah)
        unsafe { deserializer.push(Chunk::from_slice(piece), None) };
    }
    deserializer.end_of_stream();
    deserializer.finish();
    drop(storage);

    assert_eq!(completion.wait().as_ref(), Some(&*trajectory));
    let _ = std::fs::remove_file(&path);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_chained_roundtrip(
        samples in 0usize..400,
        chunk_size in 1usize..300,
        number_of_chunks in 1usize..5,
    ) {
        let trajectory = Arc::new(Trajectory::generate("prop", samples));
        let mut serializer = PullSerializer::new(chunk_size, number_of_chunks);
        let mut deserializer = PushDeserializer::new(chunk_size, number_of_chunks);
        serializer.start(Arc::clone(&trajectory));
        let completion = deserializer.start_deferred(Trajectory::default());

        loop {
            let chunk = serializer.pull();
            let done = chunk.is_empty();
            deserializer.push_owned(chunk.to_vec());
            if done {
                break;
            }
        }
        serializer.finish();
        deserializer.finish();

        prop_assert_eq!(completion.wait(), Some((*trajectory).clone()));
    }
}
