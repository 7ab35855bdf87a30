//! SHA-256 digests over byte slices and streams.

use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

/// Default streaming chunk size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Prefix used for component and content hashes
pub const DIGEST_PREFIX: &str = "sha256:";

/// SHA-256 of `data` as 64 lower-hex characters
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 of `data` rendered as `sha256:<hex>`
pub fn prefixed_digest(data: &[u8]) -> String {
    format!("{}{}", DIGEST_PREFIX, digest(data))
}

/// Drain `reader` into a digest, returning the hex digest and byte count.
pub fn stream_digest<R: Read + ?Sized>(reader: &mut R, chunk_size: usize) -> io::Result<(String, u64)> {
    copy_with_digest(reader, &mut io::sink(), chunk_size)
}

/// Copy `reader` into `writer` chunk by chunk, digesting everything forwarded.
///
/// Memory use is bounded by `chunk_size` (0 selects [`DEFAULT_CHUNK_SIZE`]).
pub fn copy_with_digest<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
) -> io::Result<(String, u64)>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let chunk_size = if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size };
    let mut buf = vec![0u8; chunk_size];
    let mut hasher = Sha256::new();
    let mut total: u64 = 0;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    writer.flush()?;

    Ok((hex::encode(hasher.finalize()), total))
}
