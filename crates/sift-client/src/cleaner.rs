use std::path::Path;
use std::sync::Arc;

use htmd::HtmlToMarkdown;
use sift_core::error::AppError;
use sift_core::traits::{Cleaner, PlainText};

use crate::email::{EmailBody, extract_body};

/// HTML-to-Markdown converter using htmd.
///
/// Strips non-content elements (script, style, nav, etc.) to minimize
/// LLM token usage.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "head", "nav", "footer", "noscript", "iframe", "svg",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }

    pub fn convert(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map_err(|e| AppError::InvalidInput(format!("HTML conversion failed: {e}")))
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for HtmdCleaner {
    fn clean(&self, _file_name: &str, raw: &[u8]) -> Result<String, AppError> {
        self.convert(&String::from_utf8_lossy(raw))
    }
}

/// Normalizer used by the CLI and server: picks a strategy by extension.
///
/// | extension      | handling                                   |
/// |----------------|--------------------------------------------|
/// | `eml`          | MIME body, HTML converted to Markdown      |
/// | `html`, `htm`  | converted to Markdown                      |
/// | anything else  | must be UTF-8 text                         |
#[derive(Clone, Default)]
pub struct ContentCleaner {
    html: HtmdCleaner,
}

impl ContentCleaner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cleaner for ContentCleaner {
    fn clean(&self, file_name: &str, raw: &[u8]) -> Result<String, AppError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "eml" => match extract_body(raw)
                .map_err(|e| AppError::InvalidInput(format!("{file_name}: {e}")))?
            {
                EmailBody::Html(html) => self.html.convert(&html),
                EmailBody::Plain(text) => Ok(text),
            },
            "html" | "htm" => self.html.clean(file_name, raw),
            _ => PlainText.clean(file_name, raw),
        }
    }
}
