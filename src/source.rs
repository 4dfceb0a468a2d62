use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

static HIDDEN_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>")
        .expect("static regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

const URL_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Unsupported file type: only .txt uploads are supported")]
    UnsupportedFile(String),
    #[error("No content found from file/url/text.")]
    NoContent,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    fn extension(&self) -> Option<String> {
        let (_, ext) = self.file_name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }

    pub fn extract_text(&self) -> Result<String, SourceError> {
        match self.extension().as_deref() {
            Some("txt") => Ok(String::from_utf8_lossy(&self.bytes).into_owned()),
            _ => Err(SourceError::UnsupportedFile(self.file_name.clone())),
        }
    }
}

/// Visible text of an HTML page, whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    let without_blocks = HIDDEN_BLOCKS.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_blocks, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reads at most `max_bytes` of the body; the rest is never downloaded.
async fn read_capped(mut resp: reqwest::Response, max_bytes: usize) -> reqwest::Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = max_bytes - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            debug!(max_bytes, "page body truncated");
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Fetches a page and returns its visible text; any failure yields "".
/// Bodies larger than `max_bytes` are cut off at that size.
pub async fn fetch_url_text(http: &reqwest::Client, raw_url: &str, max_bytes: usize) -> String {
    let parsed = match url::Url::parse(raw_url.trim()) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        _ => {
            warn!("ignoring unsupported url {}", raw_url);
            return String::new();
        }
    };
    let response = http
        .get(parsed.clone())
        .timeout(URL_FETCH_TIMEOUT)
        .send()
        .await
        .and_then(|r| r.error_for_status());
    match response {
        Ok(resp) => match read_capped(resp, max_bytes).await {
            Ok(body) => strip_html(&String::from_utf8_lossy(&body)),
            Err(err) => {
                warn!("failed to read {}: {}", parsed, err);
                String::new()
            }
        },
        Err(err) => {
            warn!("failed to fetch {}: {}", parsed, err);
            String::new()
        }
    }
}

#[derive(Debug, Default)]
pub struct ContentInput {
    pub file: Option<Upload>,
    pub url: Option<String>,
    pub text: Option<String>,
}

/// File, then URL, then pasted text; the first that yields text wins.
pub async fn resolve_source_text(
    http: &reqwest::Client,
    input: ContentInput,
    max_fetch_bytes: usize,
) -> Result<String, SourceError> {
    if let Some(upload) = input.file.as_ref().filter(|u| !u.file_name.is_empty()) {
        let text = upload.extract_text()?;
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }
    if let Some(url) = input.url.as_deref().filter(|u| !u.trim().is_empty()) {
        let text = fetch_url_text(http, url, max_fetch_bytes).await;
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }
    match input.text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(SourceError::NoContent),
    }
}
