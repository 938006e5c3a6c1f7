//! Minimal RFC 822 / MIME reader for `.eml` files.
//!
//! Only what body extraction needs: header unfolding, `multipart/*`
//! splitting, and `base64` / `quoted-printable` transfer decoding. Headers
//! with encoded words are left as-is.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sift_core::error::AppError;

const MAX_DEPTH: usize = 16;

/// The readable body of an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailBody {
    Html(String),
    Plain(String),
}

/// One leaf of the MIME tree.
#[derive(Debug, Clone)]
struct Leaf {
    mime_type: String,
    charset: Option<String>,
    attachment: bool,
    body: Vec<u8>,
}

/// Pick the body of a raw email.
///
/// The first non-attachment `text/html` part wins; otherwise the first
/// non-attachment `text/plain` part. A message without either is
/// [`AppError::InvalidInput`].
pub fn extract_body(raw: &[u8]) -> Result<EmailBody, AppError> {
    let mut leaves = Vec::new();
    collect_leaves(raw, 0, &mut leaves);

    let readable = |wanted: &str| {
        leaves
            .iter()
            .find(|leaf| !leaf.attachment && leaf.mime_type == wanted)
    };

    if let Some(leaf) = readable("text/html") {
        return Ok(EmailBody::Html(decode_text(&leaf.body, leaf.charset.as_deref())));
    }
    if let Some(leaf) = readable("text/plain") {
        return Ok(EmailBody::Plain(decode_text(&leaf.body, leaf.charset.as_deref())));
    }
    Err(AppError::InvalidInput(
        "email has no text/html or text/plain body".into(),
    ))
}

fn collect_leaves(raw: &[u8], depth: usize, out: &mut Vec<Leaf>) {
    let (header_block, body) = split_headers(raw);
    let headers = parse_headers(header_block);

    let content_type = header(&headers, "content-type").unwrap_or("text/plain");
    let (mime_type, params) = parse_content_type(content_type);

    if mime_type.starts_with("multipart/") && depth < MAX_DEPTH {
        if let Some(boundary) = param(&params, "boundary") {
            for part in split_multipart(body, boundary) {
                collect_leaves(part, depth + 1, out);
            }
            return;
        }
    }

    let attachment = header(&headers, "content-disposition")
        .map(|d| d.to_ascii_lowercase().contains("attachment"))
        .unwrap_or(false);
    let encoding = header(&headers, "content-transfer-encoding")
        .map(|e| e.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let body = match encoding.as_str() {
        "base64" => decode_base64(body),
        "quoted-printable" => decode_quoted_printable(body),
        _ => body.to_vec(),
    };

    out.push(Leaf {
        mime_type,
        charset: param(&params, "charset").map(str::to_ascii_lowercase),
        attachment,
        body,
    });
}

/// Split at the first empty line. A message with no blank line is all headers.
fn split_headers(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut line_start = 0;
    while line_start < raw.len() {
        let line_end = raw[line_start..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|p| line_start + p)
            .unwrap_or(raw.len());
        let line = trim_cr(&raw[line_start..line_end]);
        if line.is_empty() {
            let body_start = (line_end + 1).min(raw.len());
            return (&raw[..line_start], &raw[body_start..]);
        }
        line_start = line_end + 1;
    }
    (raw, &[])
}

fn parse_headers(block: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(block);
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    headers
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

fn parse_content_type(value: &str) -> (String, Vec<(String, String)>) {
    let mut pieces = value.split(';');
    let mime_type = pieces
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let params = pieces
        .filter_map(|piece| piece.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_string(),
            )
        })
        .collect();
    (mime_type, params)
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Parts between `--boundary` delimiters, stopping at `--boundary--`.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut line_start = 0;

    while line_start < body.len() {
        let line_end = body[line_start..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|p| line_start + p)
            .unwrap_or(body.len());
        let line = trim_cr(&body[line_start..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter) {
            if let Some(start) = current.take() {
                parts.push(trim_trailing_newline(&body[start..line_start]));
            }
            if rest.starts_with(b"--") {
                break;
            }
            current = Some((line_end + 1).min(body.len()));
        }
        line_start = line_end + 1;
    }

    // Unterminated final part.
    if let Some(start) = current {
        parts.push(&body[start..]);
    }
    parts
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_trailing_newline(part: &[u8]) -> &[u8] {
    let part = part.strip_suffix(b"\n").unwrap_or(part);
    part.strip_suffix(b"\r").unwrap_or(part)
}

fn decode_base64(body: &[u8]) -> Vec<u8> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    match STANDARD.decode(&compact) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(error = %e, "Invalid base64 body; keeping raw bytes");
            body.to_vec()
        }
    }
}

fn decode_quoted_printable(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let byte = body[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }
        match body.get(i + 1..i + 3) {
            // Soft line break.
            Some([b'\r', b'\n']) => i += 3,
            Some([b'\n', _]) => i += 2,
            Some([hi, lo]) => match (hex_value(*hi), hex_value(*lo)) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(byte);
                    i += 1;
                }
            },
            _ => {
                if body.get(i + 1) == Some(&b'\n') {
                    i += 2;
                } else {
                    out.push(byte);
                    i += 1;
                }
            }
        }
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    match charset {
        Some("iso-8859-1" | "latin1" | "latin-1" | "us-ascii") => {
            bytes.iter().map(|b| char::from(*b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}
