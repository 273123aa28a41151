// Loading product photos from disk as inline image payloads.

use std::path::Path;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use snaplist_core::image::ImagePayload;

/// Media type for a photo, judged by file extension.
pub fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Read a photo and encode it as a base64 data URL payload.
pub fn load_photo(path: &Path) -> anyhow::Result<ImagePayload> {
    let Some(media_type) = media_type_for(path) else {
        bail!(
            "unsupported image type for {} (use jpg, png, gif or webp)",
            path.display()
        );
    };
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }

    let data_url = format!("data:{media_type};base64,{}", STANDARD.encode(&bytes));
    ImagePayload::parse(&data_url).map_err(|e| anyhow::anyhow!("invalid image: {e}"))
}
