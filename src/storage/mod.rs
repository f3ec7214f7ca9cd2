// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};
use crate::document::ReconciledResult;
use crate::utils::error::StorageError;

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    /// Directory holding every output file for one document: /base_dir/stem/
    pub fn document_dir(&self, stem: &str) -> PathBuf {
        self.base_dir.join(stem)
    }

    fn ensure_document_dir(&self, stem: &str) -> Result<PathBuf, StorageError> {
        let target_dir = self.document_dir(stem);
        if !target_dir.exists() {
            fs::create_dir_all(&target_dir).map_err(StorageError::IoError)?;
        }
        Ok(target_dir)
    }

    /// Saves the reconciled record as pretty-printed JSON
    pub fn save_result(&self, stem: &str, result: &ReconciledResult) -> Result<PathBuf, StorageError> {
        let file_path = self.ensure_document_dir(stem)?.join(format!("{}_result.json", stem));

        let json = serde_json::to_string_pretty(result)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, json).map_err(StorageError::IoError)?;

        tracing::info!("Saved result to {}", file_path.display());
        Ok(file_path)
    }

    /// Saves a summary of the run: counts, reconciliation flags and a timestamp
    pub fn save_result_metadata(&self, stem: &str, result: &ReconciledResult) -> Result<PathBuf, StorageError> {
        let file_path = self.ensure_document_dir(stem)?.join(format!("{}_meta.json", stem));

        let metadata = serde_json::json!({
            "document": stem,
            "securities_count": result.securities.len(),
            "securities_with_value_count": result.analysis.securities_with_value_count,
            "invalid_isin_count": result.analysis.invalid_isin_count,
            "allocation_categories": result.asset_allocation.categories.len(),
            "total_value_overridden": result.analysis.total_value_overridden,
            "allocation_normalized": result.analysis.allocation_normalized,
            "sources": result.sources,
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, metadata_str).map_err(StorageError::IoError)?;

        tracing::info!("Saved metadata to {}", file_path.display());
        Ok(file_path)
    }
}
