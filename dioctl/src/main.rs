//! dioctl - exercises `directio_cache::DirectIoCache` from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use directio_cache::{CacheConfig, DirectIoCache, Whence};

#[derive(Parser)]
#[command(name = "dioctl")]
#[command(about = "Exercise the direct-I/O block cache from the command line", long_about = None)]
struct Cli {
    /// Number of blocks held in the cache's pool
    #[arg(long, global = true, default_value_t = 16)]
    capacity: usize,

    /// Block size in bytes; must be a power of two, at least 512
    #[arg(long, global = true, default_value_t = 4096)]
    block_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write text at a byte offset, flushing it to disk before exiting
    Write {
        file: PathBuf,
        offset: u64,
        text: String,
    },
    /// Read a byte range and print it as UTF-8 (lossily)
    Read {
        file: PathBuf,
        offset: u64,
        len: usize,
    },
    /// Flush any dirty blocks and fsync the file
    Sync { file: PathBuf },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match CacheConfig::new(cli.capacity, cli.block_size) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let mut cache = DirectIoCache::new(config);

    let result = match cli.command {
        Commands::Write { file, offset, text } => cmd_write(&mut cache, &file, offset, &text),
        Commands::Read { file, offset, len } => cmd_read(&mut cache, &file, offset, len),
        Commands::Sync { file } => cmd_sync(&mut cache, &file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn cmd_write(
    cache: &mut DirectIoCache,
    file: &PathBuf,
    offset: u64,
    text: &str,
) -> directio_cache::Result<()> {
    let handle = cache.open(file)?;
    cache.seek(handle, Whence::Start(offset))?;
    let written = cache.write(handle, text.as_bytes())?;
    cache.close(handle)?;
    println!("{} {written} bytes at offset {offset}", "wrote".green().bold());
    Ok(())
}

fn cmd_read(
    cache: &mut DirectIoCache,
    file: &PathBuf,
    offset: u64,
    len: usize,
) -> directio_cache::Result<()> {
    let handle = cache.open(file)?;
    cache.seek(handle, Whence::Start(offset))?;
    let mut buf = vec![0u8; len];
    let n = cache.read(handle, &mut buf)?;
    cache.close(handle)?;
    println!("{}", String::from_utf8_lossy(&buf[..n]));
    Ok(())
}

fn cmd_sync(cache: &mut DirectIoCache, file: &PathBuf) -> directio_cache::Result<()> {
    let handle = cache.open(file)?;
    cache.sync(handle)?;
    cache.close(handle)?;
    println!("{}", "synced".green().bold());
    Ok(())
}
