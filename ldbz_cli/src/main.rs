use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ldbz_codecs::codecs_for;
use ldbz_core::filename::list_table_files;
use ldbz_core::{open_table, BlockHandle, BlockWriter, CompressionVariant, Options};

/// Default raw bytes per block: 4 KB, the usual table block size.
const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "ldbz",
    about = "Write, inspect, and read compressed blocks of LevelDB-style table files",
    version
)]
struct Cli {
    /// TOML file with reader/writer options
    #[arg(long, global = true)]
    options: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into compressed blocks
    Compress {
        /// Source file to compress ("-" reads stdin)
        input: PathBuf,
        /// Destination table file
        output: PathBuf,
        /// Codec to use: none | snappy | zlib | zlib_raw (default from options)
        #[arg(short, long)]
        codec: Option<CompressionVariant>,
        /// Deflate level for the zlib codecs (0–9)
        #[arg(long)]
        level: Option<u32>,
        /// Raw bytes per block
        #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        /// Where to write the block handle list (default: <output>.handles.json)
        #[arg(long)]
        handles: Option<PathBuf>,
    },
    /// Decompress every block listed in a handle file back to raw bytes
    Decompress {
        /// Source table file
        input: PathBuf,
        /// Handle list written by `compress`
        handles: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
    },
    /// Print the trailer of every block in a handle file
    Inspect {
        /// Table file
        file: PathBuf,
        /// Handle list written by `compress`
        #[arg(long)]
        handles: PathBuf,
    },
    /// Decompress a single block at a known location
    ReadBlock {
        /// Table file
        file: PathBuf,
        /// Byte offset of the block payload
        #[arg(long)]
        offset: u64,
        /// Payload size in bytes, trailer excluded
        #[arg(long)]
        size: u64,
        /// Write raw bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the table files (.sst and .ldb) in a directory
    Scan {
        /// Database directory
        dir: PathBuf,
    },
    /// Benchmark random block reads
    Bench {
        /// Table file
        file: PathBuf,
        /// Handle list written by `compress`
        #[arg(long)]
        handles: PathBuf,
        /// Number of random blocks to read per thread
        #[arg(short, long, default_value_t = 1000)]
        count: u64,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Reader threads
        #[arg(short, long, default_value_t = 1)]
        threads: usize,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn load_options(path: Option<&Path>) -> anyhow::Result<Options> {
    match path {
        Some(p) => Options::load(p).with_context(|| format!("loading options from {:?}", p)),
        None => Ok(Options::default()),
    }
}

fn default_handles_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".handles.json");
    PathBuf::from(name)
}

fn read_handles(path: &Path) -> anyhow::Result<Vec<BlockHandle>> {
    let file = File::open(path).with_context(|| format!("opening handle list {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing handle list {:?}", path))
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read (0 at EOF).
fn read_chunk(src: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    mut options: Options,
    input: PathBuf,
    output: PathBuf,
    codec: Option<CompressionVariant>,
    level: Option<u32>,
    block_size: usize,
    handles_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    if block_size == 0 {
        anyhow::bail!("block size must be at least 1 byte");
    }
    if let Some(codec) = codec {
        options.compression = codec;
    }
    if let Some(level) = level {
        options.zlib_level = level;
    }
    options.validate()?;

    let mut src: Box<dyn Read> = if input.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(&input).with_context(|| format!("opening input file {:?}", input))?,
        ))
    };
    let dst = BufWriter::new(
        File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
    );
    let mut writer = BlockWriter::new(dst, codecs_for(&options)?, &options);

    let t0 = Instant::now();
    let mut raw_total = 0u64;
    let mut handles = Vec::new();
    let mut buf = vec![0u8; block_size];
    loop {
        let n = read_chunk(&mut src, &mut buf)?;
        if n == 0 {
            break;
        }
        handles.push(writer.write_block(&buf[..n])?);
        raw_total += n as u64;
    }
    let compressed_total = writer.offset();
    writer.finish()?;
    let elapsed = t0.elapsed();

    let handles_path = handles_path.unwrap_or_else(|| default_handles_path(&output));
    let handles_file = File::create(&handles_path)
        .with_context(|| format!("creating handle list {:?}", handles_path))?;
    let mut handles_out = BufWriter::new(handles_file);
    serde_json::to_writer(&mut handles_out, &handles)?;
    handles_out.flush()?;
    info!(blocks = handles.len(), path = ?handles_path, "wrote handle list");

    let ratio = if compressed_total == 0 {
        1.0
    } else {
        raw_total as f64 / compressed_total as f64
    };
    eprintln!("  codec       : {}", options.compression);
    eprintln!("  block size  : {}", human_bytes(block_size as u64));
    eprintln!("  blocks      : {}", handles.len());
    eprintln!("  raw size    : {}", human_bytes(raw_total));
    eprintln!("  table size  : {}", human_bytes(compressed_total));
    eprintln!("  ratio       : {:.2}x", ratio);
    eprintln!("  handles     : {:?}", handles_path);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(
    options: Options,
    input: PathBuf,
    handles: PathBuf,
    output: PathBuf,
) -> anyhow::Result<()> {
    let handles = read_handles(&handles)?;
    let reader = open_table(&input, codecs_for(&options)?, &options)
        .with_context(|| format!("opening table {:?}", input))?;

    let mut dst: Box<dyn Write> = if output.to_str() == Some("-") {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(
            File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
        ))
    };

    let t0 = Instant::now();
    let mut total_raw = 0u64;
    for (idx, handle) in handles.iter().enumerate() {
        let block = reader
            .read_block(*handle)
            .with_context(|| format!("block {} at offset {}", idx, handle.offset))?;
        total_raw += block.len() as u64;
        dst.write_all(&block)?;
    }
    dst.flush()?;

    let elapsed = t0.elapsed();
    eprintln!("  blocks      : {}", handles.len());
    eprintln!("  raw size    : {}", human_bytes(total_raw));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((total_raw as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(options: Options, file: PathBuf, handles: PathBuf) -> anyhow::Result<()> {
    let handles = read_handles(&handles)?;
    let reader = open_table(&file, codecs_for(&options)?, &options)?;
    let file_size = std::fs::metadata(&file)?.len();

    println!("=== Table: {:?} ===", file);
    println!();
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  blocks         : {}", handles.len());
    println!();
    println!(
        "  {:>8}  {:>14}  {:>12}  {:>10}  {:>10}",
        "block", "file offset", "payload", "codec", "checksum"
    );
    println!("  {}", "-".repeat(62));
    for (i, handle) in handles.iter().enumerate() {
        match reader.read_trailer(*handle) {
            Ok(trailer) => println!(
                "  {:>8}  {:>14}  {:>12}  {:>10}  {:08x}",
                i,
                handle.offset,
                human_bytes(handle.size),
                trailer.variant.name(),
                trailer.checksum
            ),
            Err(e) => println!(
                "  {:>8}  {:>14}  {:>12}  error: {}",
                i,
                handle.offset,
                human_bytes(handle.size),
                e
            ),
        }
    }
    Ok(())
}

fn run_read_block(
    options: Options,
    file: PathBuf,
    offset: u64,
    size: u64,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let reader = open_table(&file, codecs_for(&options)?, &options)?;
    let handle = BlockHandle::new(offset, size);
    let trailer = reader.read_trailer(handle)?;
    eprintln!("reading block at offset {} ({} payload bytes, trailer {})", offset, size, trailer);

    let t0 = Instant::now();
    let raw = reader.read_block(handle)?;
    let elapsed = t0.elapsed();
    eprintln!(
        "  decoded {} in {:.3}ms",
        human_bytes(raw.len() as u64),
        elapsed.as_secs_f64() * 1000.0
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &raw)?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            // Print a hex dump of the first 256 bytes
            let preview = &raw[..raw.len().min(256)];
            println!(
                "--- block @{} ({} bytes, first {} shown) ---",
                offset,
                raw.len(),
                preview.len()
            );
            for (i, chunk) in preview.chunks(16).enumerate() {
                print!("  {:04x}  ", i * 16);
                for b in chunk {
                    print!("{:02x} ", b);
                }
                for _ in chunk.len()..16 {
                    print!("   ");
                }
                print!("  |");
                for b in chunk {
                    if b.is_ascii_graphic() || *b == b' ' {
                        print!("{}", *b as char);
                    } else {
                        print!(".");
                    }
                }
                println!("|");
            }
            if raw.len() > 256 {
                println!("  ... ({} bytes remaining not shown)", raw.len() - 256);
            }
        }
    }
    Ok(())
}

fn run_scan(dir: PathBuf) -> anyhow::Result<()> {
    let tables = list_table_files(&dir).with_context(|| format!("scanning {:?}", dir))?;
    println!("{} table file(s) in {:?}", tables.len(), dir);
    for (table, path) in tables {
        let size = std::fs::metadata(&path)?.len();
        println!("  {:>10}  {:<14}  {}", table.number, table.to_string(), human_bytes(size));
    }
    Ok(())
}

fn run_bench(
    options: Options,
    file: PathBuf,
    handles: PathBuf,
    count: u64,
    seed: u64,
    threads: usize,
) -> anyhow::Result<()> {
    let handles = read_handles(&handles)?;
    if handles.is_empty() {
        anyhow::bail!("handle list has no blocks");
    }
    let threads = threads.max(1);
    let reader = open_table(&file, codecs_for(&options)?, &options)?;

    eprintln!(
        "benchmarking {} random block reads x {} thread(s) across {} blocks...",
        count,
        threads,
        handles.len()
    );

    let t0 = Instant::now();
    let results: Vec<anyhow::Result<(u64, Vec<u64>)>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..threads)
            .map(|t| {
                let reader = &reader;
                let handles = &handles;
                s.spawn(move || -> anyhow::Result<(u64, Vec<u64>)> {
                    // Simple LCG for reproducible random block indices (no external dep)
                    let mut rng = seed.wrapping_add(t as u64);
                    let mut total_raw = 0u64;
                    let mut latencies_us = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        rng = rng
                            .wrapping_mul(6364136223846793005)
                            .wrapping_add(1442695040888963407);
                        let idx = ((rng >> 33) % handles.len() as u64) as usize;
                        let started = Instant::now();
                        let block = reader.read_block(handles[idx])?;
                        latencies_us.push(started.elapsed().as_micros() as u64);
                        total_raw += block.len() as u64;
                    }
                    Ok((total_raw, latencies_us))
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| {
                w.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("benchmark thread panicked")))
            })
            .collect()
    });
    let elapsed = t0.elapsed();

    let mut total_raw = 0u64;
    let mut latencies_us = Vec::new();
    for result in results {
        let (raw, lat) = result?;
        total_raw += raw;
        latencies_us.extend(lat);
    }
    if latencies_us.is_empty() {
        anyhow::bail!("no blocks were read");
    }
    latencies_us.sort_unstable();

    let pct = |p: f64| {
        let idx = (latencies_us.len() as f64 * p) as usize;
        latencies_us[idx.min(latencies_us.len() - 1)]
    };

    println!();
    println!("=== Random Block Read Benchmark ===");
    println!("  blocks read : {}", latencies_us.len());
    println!("  total raw   : {}", human_bytes(total_raw));
    println!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!(
        "  throughput  : {}/s",
        human_bytes((total_raw as f64 / elapsed.as_secs_f64()) as u64)
    );
    println!("  latency:");
    println!("    min  : {} µs", latencies_us[0]);
    println!("    p50  : {} µs", pct(0.50));
    println!("    p95  : {} µs", pct(0.95));
    println!("    p99  : {} µs", pct(0.99));
    println!("    max  : {} µs", latencies_us[latencies_us.len() - 1]);
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let options = load_options(cli.options.as_deref())?;
    match cli.command {
        Commands::Compress {
            input,
            output,
            codec,
            level,
            block_size,
            handles,
        } => run_compress(options, input, output, codec, level, block_size, handles),
        Commands::Decompress {
            input,
            handles,
            output,
        } => run_decompress(options, input, handles, output),
        Commands::Inspect { file, handles } => run_inspect(options, file, handles),
        Commands::ReadBlock {
            file,
            offset,
            size,
            output,
        } => run_read_block(options, file, offset, size, output),
        Commands::Scan { dir } => run_scan(dir),
        Commands::Bench {
            file,
            handles,
            count,
            seed,
            threads,
        } => run_bench(options, file, handles, count, seed, threads),
    }
}
