use super::error::ArchiveResult;
use super::placement::{classify_content_type, MediaFormat};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// An uploaded file: a declared `major/minor` content type and its bytes as a stream.
pub struct Upload {
    content_type: String,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl Upload {
    pub fn new<R>(content_type: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            content_type: content_type.into(),
            reader: Box::pin(reader),
        }
    }

    pub fn from_bytes(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(content_type, Cursor::new(data.into()))
    }

    /// Stream the contents of a local file.
    pub async fn from_path(
        content_type: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(content_type, file))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn format(&self) -> ArchiveResult<MediaFormat> {
        classify_content_type(&self.content_type)
    }

    pub(crate) fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        self.reader
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
