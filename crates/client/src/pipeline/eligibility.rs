//! Which observed responses may enter the pipeline.

use schemars::JsonSchema;
use serde::Serialize;

use crate::events::ResponseObserved;

/// Why a response was not cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// URL or origin could not be parsed.
    Malformed(String),
    /// Only GET responses are cached.
    Method(String),
    Status(u16),
    MissingContentType,
    DisallowedType(String),
    SiteDisabled,
    /// The origin was purged while the body was being fetched.
    Purged,
    TooLarge(u64),
}

/// Media type essence: `text/javascript; charset=utf-8` -> `text/javascript`.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Page markup, JSON/XML data and unlabeled binary streams are never cached.
pub fn is_disallowed_type(essence: &str) -> bool {
    matches!(
        essence,
        "text/html"
            | "application/xhtml+xml"
            | "application/json"
            | "text/json"
            | "application/xml"
            | "text/xml"
            | "application/octet-stream"
            | "binary/octet-stream"
    ) || essence.ends_with("+json")
        || (essence.ends_with("+xml") && essence != "image/svg+xml")
}

/// Scripts, stylesheets and other text bodies worth compressing.
pub fn is_text_like(essence: &str) -> bool {
    essence.starts_with("text/")
        || essence.contains("javascript")
        || essence.contains("ecmascript")
        || essence == "image/svg+xml"
}

/// Apply the eligibility filter to an observed response.
///
/// The per-origin preference is checked separately because it needs
/// engine state.
pub fn check(response: &ResponseObserved, max_bytes: usize) -> Result<(), SkipReason> {
    if !response.is_retrieval() {
        return Err(SkipReason::Method(response.method.clone()));
    }
    if !response.is_success() {
        return Err(SkipReason::Status(response.status));
    }

    let content_type = response
        .content_type
        .as_deref()
        .map(essence)
        .filter(|s| !s.is_empty())
        .ok_or(SkipReason::MissingContentType)?;
    if is_disallowed_type(&content_type) {
        return Err(SkipReason::DisallowedType(content_type));
    }

    if let Some(len) = response.content_length
        && len > max_bytes as u64
    {
        return Err(SkipReason::TooLarge(len));
    }

    Ok(())
}
