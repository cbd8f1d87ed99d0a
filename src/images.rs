use std::{io::ErrorKind, path::PathBuf};

use crate::errors::AppError;

/// Public URL prefix under which locally stored images are served.
pub const LOCAL_PUBLIC_PREFIX: &str = "/static/uploads/";

/// A gear image, either an external URL or a file kept by the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    Remote(String),
    Stored(String),
}

impl ImageReference {
    /// Classifies a stored `image` column value.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(LOCAL_PUBLIC_PREFIX) {
            Some(file_name) => ImageReference::Stored(file_name.to_string()),
            None => ImageReference::Remote(raw.to_string()),
        }
    }

    /// Value persisted in the `image` column and used in rendered pages.
    pub fn as_stored_value(&self) -> String {
        match self {
            ImageReference::Remote(url) => url.clone(),
            ImageReference::Stored(file_name) => format!("{}{}", LOCAL_PUBLIC_PREFIX, file_name),
        }
    }
}

/// Backing store for gear images, picked once from configuration.
#[derive(Debug, Clone)]
pub enum ImageStore {
    Remote,
    Local { dir: PathBuf },
}

impl ImageStore {
    /// Turns admin form input into a reference this store accepts.
    pub fn accept(&self, input: &str) -> Result<ImageReference, AppError> {
        let input = input.trim();
        let is_remote = input.starts_with("http://") || input.starts_with("https://");
        match self {
            ImageStore::Remote if is_remote => Ok(ImageReference::Remote(input.to_string())),
            ImageStore::Remote => Err(AppError::Validation(
                "Image must be an http(s) URL".to_string(),
            )),
            ImageStore::Local { .. } if is_remote => Ok(ImageReference::Remote(input.to_string())),
            ImageStore::Local { .. } => {
                let file_name = input.strip_prefix(LOCAL_PUBLIC_PREFIX).unwrap_or(input);
                if !is_plain_file_name(file_name) {
                    return Err(AppError::Validation("Invalid image file name".to_string()));
                }
                Ok(ImageReference::Stored(file_name.to_string()))
            }
        }
    }

    /// Removes the artifact behind `reference`, if this store owns one.
    /// A file that is already gone is not an error.
    pub async fn discard(&self, reference: &ImageReference) -> Result<(), AppError> {
        let (dir, file_name) = match (self, reference) {
            (ImageStore::Local { dir }, ImageReference::Stored(file_name)) => (dir, file_name),
            _ => return Ok(()),
        };
        if !is_plain_file_name(file_name) {
            log::warn!("Refusing to remove image outside the upload dir: {}", file_name);
            return Ok(());
        }
        match tokio::fs::remove_file(dir.join(file_name)).await {
            Ok(()) => {
                log::info!("Removed stored image {}", file_name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Stored image {} already missing", file_name);
                Ok(())
            }
            Err(e) => Err(AppError::IoError(e)),
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}
