use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::StoreError;
use crate::models::JobPosting;

/// JSON file holding every posting collected so far.
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[allow(dead_code)]
    pub fn load(&self) -> Result<Vec<JobPosting>, StoreError> {
        load(&self.path)
    }

    /// Like [`Store::load`], but an unreadable store is moved aside and
    /// treated as empty so the run can continue.
    pub fn load_or_recover(&self) -> Result<Vec<JobPosting>, StoreError> {
        match load(&self.path) {
            Err(StoreError::Corrupt { path, source }) => {
                let backup = path.with_extension("json.corrupt");
                warn!(
                    "Store {} is corrupt ({}); moving it to {} and starting empty",
                    path.display(),
                    source,
                    backup.display()
                );
                fs::rename(&path, &backup).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub fn save(&self, postings: &[JobPosting]) -> Result<(), StoreError> {
        save(postings, &self.path)
    }

    /// Look a posting up by id, link, or an unambiguous id prefix.
    pub fn find<'a>(postings: &'a [JobPosting], key: &str) -> Option<&'a JobPosting> {
        if let Some(exact) = postings.iter().find(|p| p.id == key || p.link == key) {
            return Some(exact);
        }
        let mut prefixed = postings.iter().filter(|p| !key.is_empty() && p.id.starts_with(key));
        match (prefixed.next(), prefixed.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }
}

/// Read the store. A missing file is a first run, not an error.
pub fn load(path: &Path) -> Result<Vec<JobPosting>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    // Raw bytes so that invalid UTF-8 surfaces as corruption, not I/O.
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Overwrite the store. Written to a sibling temp file first and renamed
/// into place so a crash never leaves a truncated store behind.
pub fn save(postings: &[JobPosting], path: &Path) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(io_err)?;
    serde_json::to_writer_pretty(&mut tmp, postings)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Keep every existing posting in order, then append incoming postings whose
/// link has not been seen yet. First occurrence of a link wins.
pub fn merge(existing: &[JobPosting], incoming: &[JobPosting]) -> Vec<JobPosting> {
    let mut seen: HashSet<&str> = existing.iter().map(|p| p.link.as_str()).collect();
    let mut merged = existing.to_vec();
    for posting in incoming {
        if seen.insert(posting.link.as_str()) {
            merged.push(posting.clone());
        }
    }
    merged
}
