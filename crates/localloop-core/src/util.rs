//! Text helpers shared by configuration, the item cache and the CLI.

use crate::error::{Error, Result};

/// Trimmed text, or `None` when nothing but whitespace is left.
pub fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// A non-blank environment variable.
pub fn env_text(name: &str) -> Option<String> {
    std::env::var(name).ok().as_deref().and_then(non_blank)
}

/// Validate a backend base URL and drop its trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let value = non_blank(raw).ok_or_else(|| {
        Error::InvalidConfiguration("API base URL must not be empty".to_string())
    })?;
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(Error::InvalidConfiguration(
            "API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}
