use pubdate_common::DateError;
use pubdate_config::SiteData;
use url::Url;

/// Extensions of links that never carry an HTML article.
const MEDIA_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "tif", "tiff", "mp3", "mp4", "m4a",
    "m4v", "wav", "ogg", "mov", "avi", "webm", "zip", "gz", "rar",
];

/// Reject URLs that cannot be processed before any network call.
pub fn validate_url(raw: &str, data: &SiteData) -> Result<Url, DateError> {
    let url = Url::parse(raw.trim()).map_err(|_| DateError::validation(raw, "Invalid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DateError::validation(raw, "Unsupported URL scheme"));
    }
    let Some(host) = url.host_str() else {
        return Err(DateError::validation(raw, "Invalid URL"));
    };
    if is_media_link(&url) {
        return Err(DateError::validation(
            raw,
            "Parsing publish dates from PDFs/media links is not supported",
        ));
    }
    if data.is_ignored(host) {
        tracing::debug!(host = %host, "validate.ignored_domain");
        return Err(DateError::validation(raw, "Ignored domain"));
    }
    Ok(url)
}

fn is_media_link(url: &Url) -> bool {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    match last.rsplit_once('.') {
        Some((_, ext)) => MEDIA_EXTENSIONS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubdate_common::ErrorKind;

    fn data() -> SiteData {
        let mut data = SiteData::default();
        data.ignore_domains = vec!["ignored.test".into()];
        data
    }

    #[test]
    fn accepts_article_links() {
        let url = validate_url("https://news.test/2021/03/04/story.html", &data()).unwrap();
        assert_eq!(url.host_str(), Some("news.test"));
    }

    #[test]
    fn rejects_bad_input_before_fetching() {
        for raw in ["not a url", "ftp://news.test/a", "mailto:a@b.test"] {
            let err = validate_url(raw, &data()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{raw}");
            assert_eq!(err.url(), raw);
        }
    }

    #[test]
    fn rejects_media_links() {
        let err = validate_url("https://news.test/files/report.PDF", &data()).unwrap_err();
        assert!(err.to_string().contains("PDFs/media links"));
        assert!(validate_url("https://news.test/clip.mp4?x=1", &data()).is_err());
    }

    #[test]
    fn rejects_ignored_domains() {
        let err = validate_url("https://www.ignored.test/a", &data()).unwrap_err();
        assert!(err.to_string().contains("Ignored domain"));
    }
}
