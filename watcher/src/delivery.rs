use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::path::PathBuf;
use tracing::info;

use crate::digest::{no_updates_message, Digest, Section};
use crate::error::DeliveryError;

/// Hands a finished digest to its audience. Failures are reported to the
/// caller and never feed back into the ledger.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, subject: &str, digest: &Digest) -> Result<(), DeliveryError>;
}

/// Prints subject and HTML body to stdout.
#[derive(Debug, Default)]
pub struct ConsoleDelivery;

#[async_trait]
impl Delivery for ConsoleDelivery {
    async fn deliver(&self, subject: &str, digest: &Digest) -> Result<(), DeliveryError> {
        println!("Subject: {}\n\n{}", subject, render_html(digest));
        Ok(())
    }
}

/// Writes the HTML body to a file, creating parent directories.
#[derive(Debug, Clone)]
pub struct FileDelivery {
    path: PathBuf,
}

impl FileDelivery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Delivery for FileDelivery {
    async fn deliver(&self, subject: &str, digest: &Digest) -> Result<(), DeliveryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, render_html(digest)).await?;
        info!(path = %self.path.display(), subject, "digest written");
        Ok(())
    }
}

/// Render the digest as an HTML email body.
pub fn render_html(digest: &Digest) -> String {
    let mut body = String::new();
    for section in &digest.sections {
        match section {
            Section::Group(group) => {
                body.push_str(&format!("<h3>{}</h3><ul>", encode_text(&section.heading())));
                for bullet in &group.bullets {
                    body.push_str(&format!("<li>{}</li>", render_inline(bullet)));
                }
                body.push_str("</ul>");
            }
            Section::NoUpdates { since_hours } => {
                body.push_str(&format!("<p>{}</p>", no_updates_message(*since_hours)));
            }
        }
    }

    if digest.is_empty() {
        return body;
    }

    format!(
        "<div style='font-family:system-ui,-apple-system,Segoe UI,Roboto,sans-serif;'>\
         <h2>{}</h2>{}<hr/>\
         <p style='color:#666'>Edit the <code>[[sources]]</code> list in the configuration to add or remove sites.</p>\
         </div>",
        encode_text(&digest.subject),
        body
    )
}

/// Escape a bullet line, turning Markdown `[text](url)` links into anchors.
pub fn render_inline(line: &str) -> String {
    let mut out = String::new();
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        let Some((text, url, consumed)) = split_link(&rest[open..]) else {
            out.push_str(&encode_text(&rest[..=open]));
            rest = &rest[open + 1..];
            continue;
        };
        out.push_str(&encode_text(&rest[..open]));
        out.push_str(&format!(
            "<a href=\"{}\">{}</a>",
            encode_double_quoted_attribute(url),
            encode_text(text)
        ));
        rest = &rest[open + consumed..];
    }
    out.push_str(&encode_text(rest));
    out
}

/// Parse `[text](url)` at the start of `s`. Returns text, url and bytes consumed.
///
/// Brackets inside the text are balanced, so a title like `[Release] v1.2`
/// stays part of the link text.
fn split_link(s: &str) -> Option<(&str, &str, usize)> {
    let mut depth = 0usize;
    let mut close = None;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;
    let text = &s[1..close];
    let after = s[close + 1..].strip_prefix('(')?;
    let end = after.find(')')?;
    let url = after[..end].trim();
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }
    Some((text, url, close + 2 + end + 1))
}
