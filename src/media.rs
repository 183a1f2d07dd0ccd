use std::fs;
use std::path::Path;

use actix_web::{http::header, HttpRequest};

use crate::auth::new_id;

/// Writes an uploaded image under `media_dir/namespace/owner_id/` and
/// returns the public URL to persist on the owning record.
pub fn save_upload(
    media_dir: &str,
    namespace: &str,
    owner_id: &str,
    req: &HttpRequest,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<String, String> {
    if bytes.is_empty() {
        return Err("Select an image to upload.".to_string());
    }
    if bytes.len() > max_bytes {
        return Err("Image is too large (max 2 MB).".to_string());
    }

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let ext = match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => return Err("Unsupported image type. Use JPEG, PNG or WebP.".to_string()),
    };

    let dir = Path::new(media_dir).join(namespace).join(owner_id);
    fs::create_dir_all(&dir).map_err(|err| {
        log::error!("Upload dir create failed: {err}");
        "Could not store the image.".to_string()
    })?;

    let filename = format!("{}.{ext}", new_id());
    fs::write(dir.join(&filename), bytes).map_err(|err| {
        log::error!("Upload write failed: {err}");
        "Could not store the image.".to_string()
    })?;

    Ok(format!("/media/{namespace}/{owner_id}/{filename}"))
}
