//! chunkstream CLI
//!
//! Menyimpan dan membaca `Trajectory` lewat pipeline chunk:
//! - `save`  : pull serializer -> mmap storage
//! - `load`  : mmap storage -> push deserializer (zero-copy)
//! - `bench` : pull serializer -> push deserializer, throughput round-trip
//!
//! Usage:
//!   cargo run --release --bin chunkstream -- <save|load|bench> [PATH] [OPTIONS]

use std::io;
use std::sync::Arc;
use std::time::Instant;

use chunkstream::protocol::{HEADER_SIZE, TRAILER_SIZE};
use chunkstream::{
    Chunk, Message, MmapStorage, PipelineConfig, PullSerializer, PushDeserializer, Trajectory,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Save,
    Load,
    Bench,
}

/// Konfigurasi CLI
struct CliConfig {
    command: Command,
    path: String,
    pipeline: PipelineConfig,
    samples: usize,
    rounds: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            command: Command::Bench,
            path: "trajectory.chks".to_string(),
            pipeline: PipelineConfig::default(),
            samples: 100_000,
            rounds: 10,
        }
    }
}

fn save(config: &CliConfig) -> io::Result<()> {
    let trajectory = Arc::new(Trajectory::generate("cli", config.samples));
    let capacity = HEADER_SIZE + trajectory.encoded_len() as usize + TRAILER_SIZE;
    let mut storage = MmapStorage::create(&config.path, capacity)?;

    let start = Instant::now();
    let mut serializer = PullSerializer::from_config(config.pipeline);
    serializer.start(Arc::clone(&trajectory));
    loop {
        let chunk = serializer.pull();
        if chunk.is_empty() {
            break;
        }
        if storage.append(chunk).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "storage full before end of stream",
            ));
        }
    }
    serializer.finish();
    storage.flush()?;

    info!(
        path = %config.path,
        bytes = storage.len(),
        chunks = storage.chunk_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "trajectory saved"
    );
    println!(
        "saved {} samples ({} bytes, {} chunks) to {}",
        trajectory.len(),
        storage.len(),
        storage.chunk_count(),
        config.path
    );
    Ok(())
}

fn load(config: &CliConfig) -> io::Result<()> {
    let storage = MmapStorage::open(&config.path)?;

    let start = Instant::now();
    let mut deserializer = PushDeserializer::from_config(config.pipeline);
    let completion = deserializer.start_deferred(Trajectory::default());
    for piece in storage.chunks(config.pipeline.chunk_size) {
        // SAFETY: `storage` hidup lebih lama dari `deserializer` yang
        // di-finish di bawah, dan mapping tidak diubah selama parse.
        unsafe { deserializer.push(Chunk::from_slice(piece), None) };
    }
    deserializer.end_of_stream();
    deserializer.finish();

    let trajectory = completion
        .wait()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "deserializer abandoned"))?;
    info!(
        path = %config.path,
        bytes = storage.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "trajectory loaded"
    );
    println!(
        "loaded '{}' with {} samples from {}",
        trajectory.name,
        trajectory.len(),
        config.path
    );
    Ok(())
}

/// Satu round-trip: setiap chunk hasil pull langsung di-push
fn round_trip(pipeline: PipelineConfig, trajectory: &Arc<Trajectory>) -> Option<Trajectory> {
    let mut serializer = PullSerializer::from_config(pipeline);
    let mut deserializer = PushDeserializer::from_config(pipeline);
    serializer.start(Arc::clone(trajectory));
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
    completion.wait()
}

fn bench(config: &CliConfig) -> io::Result<()> {
    let trajectory = Arc::new(Trajectory::generate("bench", config.samples));
    let frame_bytes = HEADER_SIZE as u64 + trajectory.encoded_len() + TRAILER_SIZE as u64;

    println!("chunkstream round-trip benchmark");
    println!("================================");
    println!(
        "samples: {} | frame: {} bytes | chunk_size: {} | chunks: {}\n",
        config.samples,
        frame_bytes,
        config.pipeline.chunk_size,
        config.pipeline.number_of_chunks
    );

    let mut best = f64::MAX;
    for round in 0..config.rounds {
        let start = Instant::now();
        let decoded = round_trip(config.pipeline, &trajectory)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "round trip abandoned"))?;
        let elapsed = start.elapsed().as_secs_f64();

        if decoded != *trajectory {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "round trip produced a different trajectory",
            ));
        }
        debug!(round, elapsed_ms = elapsed * 1e3, "round finished");
        best = best.min(elapsed);
    }

    let throughput = frame_bytes as f64 / best / (1024.0 * 1024.0);
    println!("best round: {:.3} ms", best * 1e3);
    println!("throughput: {:.1} MiB/s", throughput);
    Ok(())
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn parse_number(flag: &str, value: Option<&String>) -> io::Result<usize> {
    let value = value.ok_or_else(|| invalid_input(format!("{flag} needs a value")))?;
    value
        .parse()
        .map_err(|_| invalid_input(format!("{flag}: '{value}' is not a number")))
}

fn print_help() {
    println!("chunkstream - bounded chunked (de)serialization pipeline\n");
    println!("Usage: chunkstream <save|load|bench> [PATH] [OPTIONS]\n");
    println!("Commands:");
    println!("  save <PATH>           Serialize a generated trajectory into PATH");
    println!("  load <PATH>           Deserialize the trajectory stored in PATH");
    println!("  bench                 Round-trip throughput (default)\n");
    println!("Options:");
    println!("  -c, --chunk-size <N>  Chunk size in bytes (default: 65536)");
    println!("  -n, --chunks <N>      Number of queued chunks (default: 8)");
    println!("  -s, --samples <N>     Trajectory samples (default: 100000)");
    println!("  -r, --rounds <N>      Benchmark rounds (default: 10)");
    println!("  -h, --help            Show this help\n");
    println!("Environment:");
    println!("  CHUNKSTREAM_CHUNK_SIZE, CHUNKSTREAM_NUMBER_OF_CHUNKS, RUST_LOG");
}

fn parse_args() -> io::Result<CliConfig> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = CliConfig {
        pipeline: PipelineConfig::from_env()
            .map_err(|e| invalid_input(e.to_string()))?,
        ..CliConfig::default()
    };

    let mut positional = Vec::new();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--chunk-size" | "-c" => {
                config.pipeline.chunk_size = parse_number(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--chunks" | "-n" => {
                config.pipeline.number_of_chunks = parse_number(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--samples" | "-s" => {
                config.samples = parse_number(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--rounds" | "-r" => {
                config.rounds = parse_number(&args[i], args.get(i + 1))?.max(1);
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => {
                return Err(invalid_input(format!("unknown option {flag}")));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }
    config
        .pipeline
        .validate()
        .map_err(|e| invalid_input(e.to_string()))?;

    let mut positional = positional.into_iter();
    config.command = match positional.next().as_deref() {
        None | Some("bench") => Command::Bench,
        Some("save") => Command::Save,
        Some("load") => Command::Load,
        Some(other) => return Err(invalid_input(format!("unknown command {other}"))),
    };
    if let Some(path) = positional.next() {
        config.path = path;
    }

    Ok(config)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let result = parse_args().and_then(|config| match config.command {
        Command::Save => save(&config),
        Command::Load => load(&config),
        Command::Bench => bench(&config),
    });

    if let Err(e) = result {
        eprintln!("chunkstream: {}", e);
        std::process::exit(1);
    }
}
