// Embedded image payloads (base64 text, optionally wrapped in a data URL).

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// An image ready to be inlined into a completion request.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    media_type: String,
    data: String,
}

impl ImagePayload {
    /// Parse a `data:image/...;base64,` URL or a bare base64 string.
    ///
    /// Bare payloads are assumed to be JPEG.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (media_type, data) = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest
                    .split_once(',')
                    .ok_or_else(|| "data URL has no payload".to_string())?;
                let media_type = header
                    .strip_suffix(";base64")
                    .ok_or_else(|| "data URL is not base64 encoded".to_string())?;
                (media_type.to_string(), data)
            }
            None => (DEFAULT_MEDIA_TYPE.to_string(), raw),
        };

        if !media_type.starts_with("image/") {
            return Err(format!("unsupported media type `{media_type}`"));
        }
        let data: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        if data.is_empty() {
            return Err("image payload is empty".to_string());
        }
        STANDARD
            .decode(data.as_bytes())
            .map_err(|e| format!("image payload is not valid base64: {e}"))?;

        Ok(Self { media_type, data })
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The base64 data without any data-URL prefix.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The payload as a data URL, the form stored on a listing.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

// Payloads are megabytes of base64; keep them out of logs.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("media_type", &self.media_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}
