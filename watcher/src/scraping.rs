use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::error::{FetchCause, FetchError};
use crate::http::HttpAccessor;
use crate::model::{HtmlSelectors, Item, Source};

/// Fetches an HTML listing page and extracts up to `max_items` items with the
/// source's CSS selectors.
pub async fn fetch_html(
    http: &HttpAccessor,
    source: &Source,
    selectors: &HtmlSelectors,
    max_items: usize,
) -> Result<Vec<Item>, FetchError> {
    info!("[html] GET {}", source.url);
    let body = http.fetch(&source.url).await?;
    let html = String::from_utf8_lossy(&body);
    let items = extract_items(source, selectors, &html, max_items)
        .map_err(|cause| FetchError::new(&source.url, cause))?;
    info!(source = %source.name, count = items.len(), "[html] items");
    Ok(items)
}

/// Extract items from an already-fetched page.
///
/// For each matched item node the anchor is the node itself when it is a link,
/// otherwise the first descendant matching the title selector. Nodes without an
/// anchor or without a link attribute are skipped.
pub fn extract_items(
    source: &Source,
    selectors: &HtmlSelectors,
    html: &str,
    max_items: usize,
) -> Result<Vec<Item>, FetchCause> {
    let page_url = Url::parse(&source.url)?;
    let item_sel = parse_selector(&selectors.item)?;
    let title_sel = parse_selector(&selectors.title)?;
    let date_sel = selectors.date.as_deref().map(parse_selector).transpose()?;

    let document = Html::parse_document(html);
    let base = document_base(&document, &page_url);

    let mut items = Vec::new();
    for node in document.select(&item_sel).take(max_items) {
        let anchor = if node.value().name() == "a" {
            Some(node)
        } else {
            node.select(&title_sel).next()
        };
        let Some(anchor) = anchor else {
            debug!(source = %source.name, "item node without anchor, skipping");
            continue;
        };
        let Some(href) = anchor
            .value()
            .attr(&selectors.link_attr)
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            debug!(source = %source.name, attr = %selectors.link_attr, "anchor without link, skipping");
            continue;
        };
        let full = match base.join(href) {
            Ok(u) => u.to_string(),
            Err(e) => {
                debug!(source = %source.name, href, "unresolvable link: {}", e);
                continue;
            }
        };

        let text = collapse_whitespace(&anchor.text().collect::<String>());
        let title = if text.is_empty() { full.clone() } else { text };

        let published_at = date_sel
            .as_ref()
            .and_then(|sel| node.select(sel).next())
            .and_then(node_date);

        items.push(
            Item::new(source, &title, full.clone())
                .with_id_hint(Some(full))
                .with_published_at(published_at),
        );
    }
    Ok(items)
}

fn parse_selector(selector: &str) -> Result<Selector, FetchCause> {
    Selector::parse(selector).map_err(|_| FetchCause::InvalidSelector(selector.to_string()))
}

/// The page URL, or the document's `<base href>` resolved against it.
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|b| b.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Date of a node: its `datetime` attribute (as on `<time>`), else its text.
fn node_date(node: ElementRef<'_>) -> Option<DateTime<Utc>> {
    node.value()
        .attr("datetime")
        .and_then(parse_date)
        .or_else(|| parse_date(&node.text().collect::<String>()))
}

/// Best-effort date parsing for listing pages. Returns `None` rather than guessing.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = collapse_whitespace(raw);
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(&s) {
        return Some(dt.with_timezone(&Utc));
    }
    const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
