//! Upload persistence and question resolution.
//!
//! The exterior request layer hands the pipeline a set of named byte
//! payloads. This module saves them into the run's working directory and
//! determines which of them carries the user's question.

use augur_core::config::FallbackPolicy;
use augur_core::error::{AugurError, Result};
use augur_core::upload::{FileIndex, UploadedFile};
use augur_core::workdir::WorkingDirectory;

/// Saves each upload into the working directory, returning the index of
/// field name to saved path. Index order follows upload order.
pub async fn save_uploads(
    workdir: &WorkingDirectory,
    uploads: &[UploadedFile],
) -> Result<FileIndex> {
    let mut index = FileIndex::new();
    for upload in uploads {
        let path = workdir.path().join(&upload.name);
        tokio::fs::write(&path, &upload.bytes).await?;
        index.insert(upload.name.as_str(), path);
    }
    Ok(index)
}

/// Resolves the question text from the uploaded-file index.
///
/// A file whose name contains `question` (case-insensitive) wins. Otherwise
/// the configured fallback policy selects a file: the one with the closest
/// name to `question.txt`, or simply the first upload.
pub async fn resolve_question(index: &FileIndex, policy: FallbackPolicy) -> Result<String> {
    if index.is_empty() {
        return Err(AugurError::InvalidRequest(
            "no files were uploaded".to_string(),
        ));
    }

    let named = index
        .iter()
        .find(|(name, _)| name.to_lowercase().contains("question"));

    let (name, path) = match named {
        Some(entry) => entry,
        None => {
            tracing::warn!("no upload named like a question file, applying fallback policy");
            fallback_candidate(index, policy)
        }
    };

    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        AugurError::InvalidRequest(format!("question file '{name}' is not readable text: {e}"))
    })?;
    if text.trim().is_empty() {
        return Err(AugurError::InvalidRequest(format!(
            "question file '{name}' is empty"
        )));
    }
    Ok(text)
}

fn fallback_candidate(index: &FileIndex, policy: FallbackPolicy) -> (&str, &std::path::Path) {
    match policy {
        FallbackPolicy::FirstFile => index.first().expect("index checked non-empty"),
        FallbackPolicy::ClosestName => index
            .iter()
            .max_by(|(a, _), (b, _)| {
                name_similarity(a)
                    .partial_cmp(&name_similarity(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("index checked non-empty"),
    }
}

/// Similarity of a file name to the conventional question file name.
fn name_similarity(name: &str) -> f32 {
    similar::TextDiff::from_chars(name.to_lowercase().as_str(), "question.txt").ratio()
}
