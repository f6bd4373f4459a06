use std::path::Path;

use bytes::Bytes;

use crate::error::CoreError;

/// A file the user picked, held in memory until it is uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let mime_type = guess_mime(&name).map(str::to_string);
        Self {
            name,
            mime_type,
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, CoreError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| CoreError::File {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn guess_mime(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "csv" => Some("text/csv"),
        "html" | "htm" => Some("text/html"),
        "json" => Some("application/json"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_guess() {
        assert_eq!(PendingFile::new("Report.PDF", vec![1]).mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(PendingFile::new("notes", vec![1]).mime_type, None);
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let file = PendingFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.len(), 5);
        assert_eq!(file.mime_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_from_missing_path() {
        let err = PendingFile::from_path(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::File { .. }));
    }
}
