//! Remote archive sources
//!
//! `cpan://<file>` expands to `<mirror>/modules/by-module/<Top>/<file>`, where
//! `<Top>` is the file name up to its first hyphen.

use std::io::Cursor;

use super::{
    archive_name_prefix, decompressing_reader, ArchiveRef, FetchError, SourceError, UrlFetcher,
};

/// Mirror used when none is configured
pub const DEFAULT_MIRROR: &str = "https://www.cpan.org";

/// Shorthand scheme, matched case-insensitively
pub const SHORTHAND_SCHEME: &str = "cpan://";

/// Fetch the archive behind `spec` and open it
pub fn open(spec: &str, mirror: &str, fetcher: &UrlFetcher) -> Result<ArchiveRef, SourceError> {
    let url = expand_url(spec, mirror)?;
    let display_name = url_file_name(&url)?;

    let content = fetcher.fetch(&url)?;
    let reader = decompressing_reader(Cursor::new(content))
        .map_err(|e| SourceError::io(&url, e))?;

    Ok(ArchiveRef {
        reader,
        name_prefix: archive_name_prefix(&display_name).to_string(),
        source_path: url,
        display_name,
    })
}

/// Expand the shorthand scheme; other URLs pass through unchanged
///
/// ```
/// # use archinc::source::network::{expand_url, DEFAULT_MIRROR};
/// let url = expand_url("CPAN://JSON-PP-2.97001.tar.gz", DEFAULT_MIRROR).unwrap();
/// assert_eq!(url, "https://www.cpan.org/modules/by-module/JSON/JSON-PP-2.97001.tar.gz");
/// ```
pub fn expand_url(spec: &str, mirror: &str) -> Result<String, SourceError> {
    let is_shorthand = spec
        .get(..SHORTHAND_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(SHORTHAND_SCHEME));
    if !is_shorthand {
        return Ok(spec.to_string());
    }

    let file = &spec[SHORTHAND_SCHEME.len()..];
    let top = match file.split_once('-') {
        Some((top, _)) if !top.is_empty() && !top.contains('/') => top,
        _ => return Err(SourceError::InvalidShorthand(spec.to_string())),
    };

    Ok(format!(
        "{}/modules/by-module/{}/{}",
        mirror.trim_end_matches('/'),
        top,
        file
    ))
}

/// Last path segment of a URL
fn url_file_name(url: &str) -> Result<String, SourceError> {
    let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(String::from)
        .ok_or_else(|| FetchError::InvalidUrl(url.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_shorthand_default_mirror() {
        assert_eq!(
            expand_url("CPAN://JSON-PP-2.97001.tar.gz", DEFAULT_MIRROR).unwrap(),
            "https://www.cpan.org/modules/by-module/JSON/JSON-PP-2.97001.tar.gz"
        );
    }

    #[test]
    fn test_expand_shorthand_custom_mirror() {
        assert_eq!(
            expand_url("cpan://Try-Tiny-0.31.tar.gz", "http://mirror.local/cpan/").unwrap(),
            "http://mirror.local/cpan/modules/by-module/Try/Try-Tiny-0.31.tar.gz"
        );
    }

    #[test]
    fn test_shorthand_without_hyphen_fails() {
        let result = expand_url("cpan://Plain.tar.gz", DEFAULT_MIRROR);
        assert!(matches!(result, Err(SourceError::InvalidShorthand(_))));
    }

    #[test]
    fn test_direct_url_unchanged() {
        let url = "https://example.com/dist/Foo-Bar-1.0.tar.gz";
        assert_eq!(expand_url(url, DEFAULT_MIRROR).unwrap(), url);
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(
            url_file_name("https://example.com/dist/Foo-Bar-1.0.tar.gz").unwrap(),
            "Foo-Bar-1.0.tar.gz"
        );
        assert!(url_file_name("https://example.com/").is_err());
    }
}
