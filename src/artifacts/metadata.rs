use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// What the cache check saw at a destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheProbe {
    /// A non-empty file; usable without downloading.
    Hit { size_bytes: u64 },
    Empty,
    Missing,
    /// The probe itself failed; callers fall through to a download.
    Unreadable,
}

impl CacheProbe {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheProbe::Hit { .. })
    }
}

pub fn probe_cached(path: &Path) -> CacheProbe {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => CacheProbe::Hit {
            size_bytes: metadata.len(),
        },
        Ok(metadata) if metadata.is_file() => CacheProbe::Empty,
        Ok(_) => CacheProbe::Unreadable,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => CacheProbe::Missing,
        Err(err) => {
            tracing::debug!("cache probe for {} failed: {err}", path.display());
            CacheProbe::Unreadable
        }
    }
}

pub fn compute_sha256(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader.read(&mut buffer).context("hash read")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
