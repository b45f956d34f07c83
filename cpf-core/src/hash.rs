//! Content digest used for reload change detection.
//!
//! The core only ever compares digests for equality, so any fixed-size
//! content-addressable hash works; we use SHA-256 (`sha2`, already part of
//! the pack's dependency surface via `drasi-server`'s `xtask` crate).

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::error::CoreError;

const BUF_SIZE: usize = 64 * 1024;

/// A fixed-size content digest. Only equality matters to the rest of the
/// core; `Display` renders lowercase hex for `print_loaded`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// Digest the bytes of `path`. Fatal if the file cannot be opened or
/// read.
pub fn digest_file(path: &Path) -> anyhow::Result<Digest> {
    let mut file = File::open(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = read_chunk(&mut file, &mut buf).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let out: [u8; 32] = hasher.finalize().into();
    Ok(Digest(out))
}

fn read_chunk(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    file.read(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn same_content_same_digest() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"hello plugin").unwrap();
        b.write_all(b"hello plugin").unwrap();

        let da = digest_file(a.path()).unwrap();
        let db = digest_file(b.path()).unwrap();
        assert_eq!(da, db);
    }

    #[test]
    fn different_content_different_digest() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"version one").unwrap();
        b.write_all(b"version two").unwrap();

        let da = digest_file(a.path()).unwrap();
        let db = digest_file(b.path()).unwrap();
        assert_ne!(da, db);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(digest_file(Path::new("/nonexistent/path/to/plugin.so")).is_err());
    }

    #[test]
    fn display_is_lowercase_hex_of_expected_length() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"x").unwrap();
        let d = digest_file(f.path()).unwrap();
        let rendered = format!("{d}");
        assert_eq!(rendered.len(), 64);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
