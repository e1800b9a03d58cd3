use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio_util::io::ReaderStream;

/// Size of the chunks a file body is streamed in
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// Body of a transfer, chunk by chunk
pub(crate) type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Where the bytes of a candidate file come from
#[derive(Debug, Clone)]
pub enum FileContent {
    /// Content held in memory
    Memory(Bytes),
    /// Content read from disk when the transfer starts
    Path(PathBuf),
}

/// Name, type and size of a candidate file, without its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Display name
    pub name: String,
    /// Declared MIME type, sent as `Content-Type`
    pub mime_type: String,
    /// Size in bytes
    pub size_bytes: u64,
}

/// A file the user selected for upload
#[derive(Debug, Clone)]
pub struct CandidateFile {
    info: FileInfo,
    content: FileContent,
}

impl CandidateFile {
    /// Creates a candidate file from in-memory content
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        let content = content.into();
        Self {
            info: FileInfo {
                name: name.into(),
                mime_type: mime_type.into(),
                size_bytes: content.len() as u64,
            },
            content: FileContent::Memory(content),
        }
    }

    /// Creates a candidate file backed by a file on disk
    ///
    /// The size is read from the file's metadata now; the content is read
    /// only when a transfer starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read or the path is not a file
    pub async fn from_path(
        path: impl AsRef<Path>,
        mime_type: impl Into<String>,
    ) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );

        Ok(Self {
            info: FileInfo {
                name,
                mime_type: mime_type.into(),
                size_bytes: metadata.len(),
            },
            content: FileContent::Path(path.to_path_buf()),
        })
    }

    /// Guesses a MIME type from the file extension
    #[must_use]
    pub fn guess_mime_type(path: impl AsRef<Path>) -> &'static str {
        let extension = path
            .as_ref()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());

        match extension.as_deref() {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("pdf") => "application/pdf",
            Some("zip") => "application/zip",
            Some("json") => "application/json",
            Some("txt") => "text/plain",
            _ => "application/octet-stream",
        }
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Declared MIME type
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.info.mime_type
    }

    /// Size in bytes
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.info.size_bytes
    }

    /// Content handle
    #[must_use]
    pub const fn content(&self) -> &FileContent {
        &self.content
    }

    /// Content-free summary
    #[must_use]
    pub fn info(&self) -> FileInfo {
        self.info.clone()
    }

    /// Opens the content as a stream of chunks
    pub(crate) async fn open_stream(&self) -> io::Result<ChunkStream> {
        match &self.content {
            FileContent::Memory(bytes) => {
                let chunks: Vec<io::Result<Bytes>> = (0..bytes.len())
                    .step_by(CHUNK_SIZE)
                    .map(|start| Ok(bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len()))))
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
            FileContent::Path(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::pin(ReaderStream::with_capacity(file, CHUNK_SIZE)))
            }
        }
    }
}
