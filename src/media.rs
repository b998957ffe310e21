use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    constants::IMAGE_FORMATS,
    error::{Error, HtmlError},
};

pub const RECIPE_IMAGES: &str = "recipes";
pub const AVATARS: &str = "avatars";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Decodes `data:image/<fmt>;base64,<data>`.
pub fn decode_data_uri(value: &str) -> Result<DecodedImage, Error> {
    let invalid = || HtmlError::InvalidRequest.new("Image must be a base64 encoded data URI.");

    let (header, data) = value.trim().split_once(";base64,").ok_or_else(invalid)?;
    let format = header.strip_prefix("data:image/").ok_or_else(invalid)?;

    let extension = IMAGE_FORMATS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(format))
        .map(|(_, extension)| *extension)
        .ok_or_else(|| HtmlError::InvalidRequest.new("Unsupported image format."))?;

    let bytes = STANDARD.decode(data.trim()).map_err(|_| invalid())?;
    if bytes.is_empty() {
        return Err(HtmlError::InvalidRequest.new("Image is empty."));
    }

    Ok(DecodedImage { extension, bytes })
}

/// Writes the image below `root/folder` and returns its public `/media/...` path.
pub async fn store_image(root: &Path, folder: &str, image: DecodedImage) -> Result<String, Error> {
    let file_name = format!("{}.{}", uuid::Uuid::new_v4(), image.extension);
    let directory = root.join(folder);

    tokio::fs::create_dir_all(&directory).await.map_err(|e| {
        log::error!("> Failed to create media directory {directory:?}: {e}");
        HtmlError::InternalServerError.default()
    })?;

    tokio::fs::write(directory.join(&file_name), &image.bytes)
        .await
        .map_err(|e| {
            log::error!("> Failed to store image {file_name}: {e}");
            HtmlError::InternalServerError.default()
        })?;

    log::trace!("> Stored {folder}/{file_name}");
    Ok(format!("/media/{folder}/{file_name}"))
}

/// Decodes and stores a data URI in one step.
pub async fn save_data_uri(root: &Path, folder: &str, value: &str) -> Result<String, Error> {
    let image = decode_data_uri(value)?;
    store_image(root, folder, image).await
}

/// Deletes a file previously returned by [`store_image`]. Failures are logged only.
pub async fn remove_image(root: &Path, public_path: &str) {
    let relative = match public_path.strip_prefix("/media/") {
        Some(relative) if !relative.split('/').any(|part| part.is_empty() || part == "..") => {
            relative
        }
        _ => {
            log::warn!("> Refusing to remove {public_path}: not a stored image");
            return;
        }
    };

    match tokio::fs::remove_file(root.join(relative)).await {
        Ok(()) => log::trace!("> Removed {relative}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::error!("> Failed to remove image {relative}: {e}"),
    }
}
