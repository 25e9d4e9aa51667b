//! Store form upload handling
//!
//! The add/edit store form is posted as multipart/form-data so it can carry
//! a photo. Text fields become a [`StoreDraft`]; the `photo` part, when
//! present and non-empty, is written under the upload directory as
//! `{uuid}.{ext}`.

use axum::extract::Multipart;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::services::StoreDraft;

pub const MSG_FILETYPE: &str = "That filetype isn't allowed!";
pub const MSG_FILE_TOO_LARGE: &str = "That photo is too large!";

/// Why a store form could not be read
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The visitor sent something we refuse; shown as a notice
    #[error("{0}")]
    Rejected(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Read the store form, saving the photo if one was sent
///
/// A photo already written is removed again when the rest of the form
/// cannot be read.
pub async fn read_store_form(
    multipart: Multipart,
    config: &UploadConfig,
) -> Result<StoreDraft, UploadError> {
    let mut draft = StoreDraft::default();
    match read_fields(multipart, config, &mut draft).await {
        Ok(()) => Ok(draft),
        Err(e) => {
            discard_photo(config, draft.photo.as_deref()).await;
            Err(e)
        }
    }
}

async fn read_fields(
    mut multipart: Multipart,
    config: &UploadConfig,
    draft: &mut StoreDraft,
) -> Result<(), UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read multipart: {}", e))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "photo" {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read photo: {}", e))?;

            // Browsers send an empty part when no file was chosen
            if data.is_empty() {
                continue;
            }
            let ext = match config.get_extension(&content_type) {
                Some(ext) if config.is_type_allowed(&content_type) => ext,
                _ => return Err(UploadError::Rejected(MSG_FILETYPE)),
            };
            if data.len() as u64 > config.max_file_size {
                return Err(UploadError::Rejected(MSG_FILE_TOO_LARGE));
            }

            let saved = save_photo(&config.path, &data, ext).await?;
            // Only the last photo part is kept
            if let Some(previous) = draft.photo.replace(saved) {
                discard_photo(config, Some(&previous)).await;
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read field {}: {}", name, e))?;
        match name.as_str() {
            "name" => draft.name = value,
            "description" => draft.description = value,
            "tags" => draft.tags.push(value),
            "address" => draft.address = value,
            "lng" => draft.lng = value.trim().parse().ok(),
            "lat" => draft.lat = value.trim().parse().ok(),
            _ => {}
        }
    }

    Ok(())
}

async fn save_photo(dir: &Path, data: &[u8], ext: &str) -> anyhow::Result<String> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create upload directory: {}", e))?;

    let filename = format!("{}.{}", Uuid::new_v4(), ext);
    fs::write(dir.join(&filename), data)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to save photo: {}", e))?;

    tracing::debug!("Saved photo {}", filename);
    Ok(filename)
}

/// Remove a photo saved for a form that was then rejected
pub async fn discard_photo(config: &UploadConfig, filename: Option<&str>) {
    if let Some(filename) = filename {
        if let Err(e) = fs::remove_file(config.path.join(filename)).await {
            tracing::warn!("Failed to remove unused photo {}: {}", filename, e);
        }
    }
}
