use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha1::{Digest, Sha1};
use tracing::warn;

const CHUNK_SIZE: usize = 8192;

/// Incremental SHA-1 producing the lowercase hex form used for comparisons.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha1,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}

pub fn sha1_bytes(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finish()
}

pub fn sha1_file(path: impl AsRef<Path>) -> io::Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).inspect_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            warn!(path = %path.display(), "file to hash not found");
        }
    })?;
    let mut hasher = ContentHasher::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finish())
}

/// Compares two hex digests ignoring case.
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
