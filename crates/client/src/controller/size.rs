//! Representative sizes for responses that arrive without a byte count.
//!
//! Chunked transfers without a length header would otherwise be credited
//! as zero bytes saved. The estimate is keyed by file-extension family.

use schemars::JsonSchema;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssetFamily {
    Script,
    Style,
    Font,
    Image,
    Video,
    Other,
}

impl AssetFamily {
    /// Family from the extension of a URL's last path segment.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let file = path.rsplit('/').next().unwrap_or_default();
        let ext = file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("js" | "mjs" | "cjs") => Self::Script,
            Some("css") => Self::Style,
            Some("woff" | "woff2" | "ttf" | "otf" | "eot") => Self::Font,
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" | "bmp") => Self::Image,
            Some("mp4" | "webm" | "m4v" | "mov" | "ogv" | "m3u8" | "ts") => Self::Video,
            _ => Self::Other,
        }
    }

    /// Fixed representative byte count for the family.
    pub fn typical_bytes(self) -> u64 {
        match self {
            Self::Script => 50_000,
            Self::Style => 20_000,
            Self::Font => 40_000,
            Self::Image => 30_000,
            Self::Video => 500_000,
            Self::Other => 10_000,
        }
    }
}

/// Exact size when known, otherwise the family estimate. Never zero.
pub fn credited_bytes(url: &str, content_length: Option<u64>) -> u64 {
    match content_length {
        Some(len) if len > 0 => len,
        _ => AssetFamily::from_url(url).typical_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_url() {
        assert_eq!(AssetFamily::from_url("https://cdn.example/app.min.js?v=2"), AssetFamily::Script);
        assert_eq!(AssetFamily::from_url("https://cdn.example/site.CSS"), AssetFamily::Style);
        assert_eq!(AssetFamily::from_url("https://cdn.example/f/inter.woff2"), AssetFamily::Font);
        assert_eq!(AssetFamily::from_url("https://cdn.example/logo.webp"), AssetFamily::Image);
        assert_eq!(AssetFamily::from_url("https://cdn.example/intro.mp4"), AssetFamily::Video);
        assert_eq!(AssetFamily::from_url("https://cdn.example/api/data"), AssetFamily::Other);
        assert_eq!(AssetFamily::from_url("https://cdn.example.js/"), AssetFamily::Other);
    }

    #[test]
    fn test_credited_bytes_prefers_exact() {
        assert_eq!(credited_bytes("https://cdn.example/app.js", Some(1234)), 1234);
        assert_eq!(credited_bytes("https://cdn.example/app.js", None), 50_000);
        assert_eq!(credited_bytes("https://cdn.example/app.css", Some(0)), 20_000);
    }
}
