//! Thin wrappers around the OS primitives the cache needs: opening a file in
//! direct-I/O mode, positioned reads/writes that do not disturb any cursor,
//! querying file size, and forcing data to stable storage.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

/// Default permissions for files created by `open`, mirroring the 0644 used
/// by the original `::open(path, O_RDWR | O_CREAT | O_DIRECT, 0644)` call.
const CREATE_MODE: u32 = 0o644;

/// Opens `path` read-write, creating it if absent, bypassing the OS page
/// cache via `O_DIRECT`.
pub fn open_direct(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(CREATE_MODE)
        .custom_flags(libc::O_DIRECT)
        .open(path)
}

/// Reads exactly `buf.len()` bytes at `offset`, or fewer if the file ends
/// first (a short read near EOF, which the caller zero-fills). Does not
/// move any file cursor.
pub fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read_at(&mut buf[total..], offset + total as u64) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Writes the full contents of `buf` at `offset`. A short write (anything
/// less than `buf.len()` written) is reported as an error: write-back must
/// be complete per the cache's write-back contract.
pub fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match file.write_at(&buf[written..], offset + written as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "partial write-back to underlying file",
                ))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Queries the current size of the underlying file, used by `seek`'s
/// `FromEnd` mode.
pub fn file_size(file: &File) -> io::Result<u64> {
    Ok(file.metadata()?.len())
}

/// Forces the file's data and metadata to stable storage.
pub fn sync_all(file: &File) -> io::Result<()> {
    file.sync_all()
}
