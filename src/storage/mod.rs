// Blob storage
// Narrow seam over the artifact store. Pipelines address blobs by
// slash-separated names under a bucket; the local backend maps the bucket
// onto a directory so every pipeline runs unchanged against a filesystem.


use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{HubError, Result};

/// Blob store operations used by the pipelines.
///
/// Names use `/` separators and are always relative to the store root
/// (e.g. `harvest/20240101T000000Z/page_00000.xml`).
pub trait BlobStore {
    fn put_bytes(&self, name: &str, data: &[u8]) -> Result<()>;
    fn get_bytes(&self, name: &str) -> Result<Vec<u8>>;
    /// All blob names under `prefix`, sorted lexicographically.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    #[inline]
    fn put_text(&self, name: &str, text: &str) -> Result<()> {
        self.put_bytes(name, text.as_bytes())
    }

    #[inline]
    fn get_text(&self, name: &str) -> Result<String> {
        let data = self.get_bytes(name)?;
        String::from_utf8(data)
            .map_err(|e| HubError::Storage(format!("blob '{name}' is not valid UTF-8: {e}")))
    }

    #[inline]
    fn put_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|e| HubError::Storage(format!("failed to serialize blob '{name}': {e}")))?;
        self.put_text(name, &text)
    }

    #[inline]
    fn get_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let text = self.get_text(name)?;
        serde_json::from_str(&text)
            .map_err(|e| HubError::Storage(format!("failed to parse blob '{name}': {e}")))
    }
}

/// Filesystem-backed blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in name.split('/').filter(|segment| !segment.is_empty()) {
            path.push(segment);
        }
        path
    }
}

impl BlobStore for LocalBlobStore {
    #[inline]
    fn put_bytes(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        debug!("Wrote blob {name} ({} bytes)", data.len());
        Ok(())
    }

    #[inline]
    fn get_bytes(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(name);
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HubError::NotFound(format!("blob '{name}' does not exist")))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        collect_files(&self.root, &self.root, &mut names)?;
        names.retain(|name| name.starts_with(prefix));
        names.sort();
        Ok(names)
    }
}

fn collect_files(root: &Path, dir: &Path, names: &mut Vec<String>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, names)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let name = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
    }
    Ok(())
}
