use anyhow::Result;
use url::Url;

pub fn get_filename_from_url(url_str: &str) -> Result<String> {
    let url = Url::parse(url_str)?;

    if let Some(segments) = url.path_segments() {
        if let Some(filename) = segments.last() {
            if !filename.is_empty() {
                return Ok(filename.to_string());
            }
        }
    }

    // Fallback if no filename found in path
    Ok(format!("download_{}", uuid::Uuid::new_v4()))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

/// Stable checkpoint key for a URL: the sanitized last path segment, or a
/// random name when the URL cannot be parsed.
pub fn derive_key(url_str: &str) -> String {
    match get_filename_from_url(url_str) {
        Ok(name) => sanitize_filename(&name),
        Err(_) => format!("download_{}", uuid::Uuid::new_v4()),
    }
}
