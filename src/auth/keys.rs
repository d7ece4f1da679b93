use std::path::PathBuf;
use std::sync::RwLock;
use std::time::SystemTime;

use anyhow::Context;

/// Supplies the secret used to sign and verify tokens.
pub trait KeyRetriever: Send + Sync {
    fn get_one(&self) -> anyhow::Result<Vec<u8>>;
}

/// Secret backed by a file. Each call stats the file and re-reads it only
/// when its modification time or length changed, so a rotated file is
/// picked up without a restart.
pub struct FileKeyRetriever {
    path: PathBuf,
    cached: RwLock<Option<CachedKey>>,
}

struct CachedKey {
    modified: SystemTime,
    len: u64,
    key: Vec<u8>,
}

impl FileKeyRetriever {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    fn read_key(&self) -> anyhow::Result<Vec<u8>> {
        let mut key = std::fs::read(&self.path)
            .with_context(|| format!("reading security file {}", self.path.display()))?;
        while matches!(key.last(), Some(b'\n' | b'\r')) {
            key.pop();
        }
        if key.is_empty() {
            anyhow::bail!("security file {} is empty", self.path.display());
        }
        Ok(key)
    }
}

impl KeyRetriever for FileKeyRetriever {
    fn get_one(&self) -> anyhow::Result<Vec<u8>> {
        let meta = std::fs::metadata(&self.path)
            .with_context(|| format!("reading security file {}", self.path.display()))?;
        let modified = meta.modified()?;
        let len = meta.len();

        {
            let cached = self.cached.read().unwrap_or_else(|p| p.into_inner());
            if let Some(c) = cached.as_ref() {
                if c.modified == modified && c.len == len {
                    return Ok(c.key.clone());
                }
            }
        }

        let key = self.read_key()?;
        let mut cached = self.cached.write().unwrap_or_else(|p| p.into_inner());
        *cached = Some(CachedKey {
            modified,
            len,
            key: key.clone(),
        });
        Ok(key)
    }
}

/// Fixed in-memory secret.
pub struct StaticKey(Vec<u8>);

impl StaticKey {
    pub fn new(key: Vec<u8>) -> Self {
        Self(key)
    }
}

impl KeyRetriever for StaticKey {
    fn get_one(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}
