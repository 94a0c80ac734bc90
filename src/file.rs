//! Binary handle for candidate documents.
//!
//! A [`SourceFile`] carries the descriptive attributes the validation gate needs (name, size,
//! declared MIME type, last-modified timestamp) and knows how to read its bytes either from
//! memory or from disk. Reads used during validation are synchronous and bounded; the full
//! read performed by the transport is async.

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

#[derive(Clone)]
enum FileContent {
    Memory(Arc<[u8]>),
    Disk(PathBuf),
}

/// Externally owned file handle submitted for upload.
#[derive(Clone)]
pub struct SourceFile {
    name: String,
    size: u64,
    mime_type: String,
    last_modified_ms: i64,
    content: FileContent,
}

impl SourceFile {
    /// Build a handle around bytes already held in memory.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified_ms: i64,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            mime_type: normalize_mime(&mime_type.into()),
            last_modified_ms,
            content: FileContent::Memory(Arc::from(data)),
        }
    }

    /// Build a handle for a file on disk.
    ///
    /// The MIME type is guessed from the extension and falls back to
    /// `application/octet-stream`; size and modification time come from filesystem metadata.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();
        let last_modified_ms = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type,
            last_modified_ms,
            content: FileContent::Disk(path.to_path_buf()),
        })
    }

    /// Override the declared MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = normalize_mime(&mime_type.into());
        self
    }

    /// Override the declared size without touching the content.
    ///
    /// Hosts that learn the size from an external listing use this; the validation gate only
    /// trusts the declared value.
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// File name as supplied by the host.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Declared MIME type (lower-cased).
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Last modification time in milliseconds since the Unix epoch.
    pub fn last_modified_ms(&self) -> i64 {
        self.last_modified_ms
    }

    /// Lower-cased final extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }

    /// Identity used for duplicate detection: `(name, size, last_modified)`.
    pub fn fingerprint(&self) -> (&str, u64, i64) {
        (&self.name, self.size, self.last_modified_ms)
    }

    /// Read at most `limit` bytes from the start of the file.
    pub fn read_prefix(&self, limit: usize) -> io::Result<Vec<u8>> {
        match &self.content {
            FileContent::Memory(data) => Ok(data[..data.len().min(limit)].to_vec()),
            FileContent::Disk(path) => {
                let file = std::fs::File::open(path)?;
                let mut buffer = Vec::with_capacity(limit.min(64 * 1024));
                file.take(limit as u64).read_to_end(&mut buffer)?;
                Ok(buffer)
            }
        }
    }

    /// Read the whole file.
    pub async fn read_all(&self) -> io::Result<Vec<u8>> {
        match &self.content {
            FileContent::Memory(data) => Ok(data.to_vec()),
            FileContent::Disk(path) => tokio::fs::read(path).await,
        }
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match &self.content {
            FileContent::Memory(_) => "memory",
            FileContent::Disk(_) => "disk",
        };
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .field("last_modified_ms", &self.last_modified_ms)
            .field("backing", &backing)
            .finish()
    }
}

fn normalize_mime(mime_type: &str) -> String {
    mime_type.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_and_stem_handle_dotfiles() {
        let file = SourceFile::from_bytes("report.final.PDF", "application/pdf", 0, vec![]);
        assert_eq!(file.extension().as_deref(), Some("pdf"));
        assert_eq!(file.stem(), "report.final");

        let hidden = SourceFile::from_bytes(".DS_Store", "application/octet-stream", 0, vec![]);
        assert!(hidden.extension().is_none());
        assert_eq!(hidden.stem(), ".DS_Store");
    }

    #[test]
    fn declared_mime_is_trimmed_and_lowercased() {
        let file = SourceFile::from_bytes("a.pdf", "  Application/PDF\t", 0, vec![]);
        assert_eq!(file.mime_type(), "application/pdf");
        assert_eq!(file.with_mime_type(" TEXT/plain ").mime_type(), "text/plain");
    }

    #[test]
    fn read_prefix_is_bounded() {
        let file = SourceFile::from_bytes("a.txt", "text/plain", 0, b"hello world".to_vec());
        assert_eq!(file.read_prefix(5).unwrap(), b"hello");
        assert_eq!(file.read_prefix(100).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn from_path_reads_metadata_and_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statement.pdf");
        let mut handle = std::fs::File::create(&path).unwrap();
        handle.write_all(b"%PDF-1.7\n").unwrap();
        drop(handle);

        let file = SourceFile::from_path(&path).unwrap();
        assert_eq!(file.name(), "statement.pdf");
        assert_eq!(file.size(), 9);
        assert_eq!(file.mime_type(), "application/pdf");
        assert!(file.last_modified_ms() > 0);
        assert_eq!(file.read_prefix(4).unwrap(), b"%PDF");
        assert_eq!(file.read_all().await.unwrap().len(), 9);
    }

    #[test]
    fn from_path_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SourceFile::from_path(dir.path()).is_err());
    }
}
