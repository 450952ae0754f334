use crate::error::{Error, Result};

/// Output file name for a resource URL: its last non-empty path segment.
///
/// Query and fragment are ignored; no percent-decoding is applied.
///
/// # Examples
///
/// ```
/// use segdl_fetch::file_name_from_url;
///
/// let name = file_name_from_url("https://example.com/pub/data.tar.gz?sig=abc#top").unwrap();
/// assert_eq!(name, "data.tar.gz");
/// assert!(file_name_from_url("https://example.com/").is_err());
/// ```
pub fn file_name_from_url(url: &str) -> Result<String> {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();

    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_query,
    };

    match path.rsplit('/').find(|segment| !segment.is_empty()) {
        Some(name) if name != "." && name != ".." => Ok(name.to_string()),
        _ => Err(Error::InvalidUrl(format!(
            "no file name in the path of '{url}'"
        ))),
    }
}
