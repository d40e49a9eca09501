//! YAML encoding of the status document

use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use super::error::{StorageError, StorageResult};
use super::types::StatusDocument;

/// Decode a status document. Empty content is an empty document.
pub fn decode(path: &Path, content: &str) -> StorageResult<StatusDocument> {
    if content.trim().is_empty() {
        return Ok(StatusDocument::default());
    }
    serde_yaml::from_str(content).map_err(|e| StorageError::corrupted(path, e))
}

pub fn encode(document: &StatusDocument) -> StorageResult<String> {
    serde_yaml::to_string(document).map_err(StorageError::serialization)
}

/// Read the document at `path`; a missing file is an empty document
pub async fn read_document(path: &Path) -> StorageResult<StatusDocument> {
    match fs::read_to_string(path).await {
        Ok(content) => decode(path, &content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StatusDocument::default()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Replace the document at `path` through a sibling temp file and rename
pub async fn write_document(path: &Path, document: &StatusDocument) -> StorageResult<()> {
    let content = encode(document)?;
    let temp_file = temp_path(path);

    fs::write(&temp_file, content)
        .await
        .map_err(|e| StorageError::io(&temp_file, e))?;

    if let Err(e) = fs::rename(&temp_file, path).await {
        let _ = fs::remove_file(&temp_file).await;
        return Err(StorageError::io(path, e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "status".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
}
