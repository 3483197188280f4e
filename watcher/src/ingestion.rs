use feed_rs::model::Entry;
use feed_rs::parser::Builder;
use tracing::info;

use crate::error::{FetchCause, FetchError};
use crate::http::HttpAccessor;
use crate::model::{Item, Source, SourceKind};
use crate::scraping;

/// Fetch one source and normalize it into canonical items, dispatching on its kind.
/// Never touches the ledger.
pub async fn fetch_source(
    http: &HttpAccessor,
    source: &Source,
    max_items: usize,
) -> Result<Vec<Item>, FetchError> {
    match &source.kind {
        SourceKind::Feed => fetch_feed(http, source, max_items).await,
        SourceKind::Html(selectors) => {
            scraping::fetch_html(http, source, selectors, max_items).await
        }
    }
}

/// Fetches a syndication feed (RSS, Atom or JSON Feed) and maps up to `max_items`
/// entries to items, keeping the feed's own order.
pub async fn fetch_feed(
    http: &HttpAccessor,
    source: &Source,
    max_items: usize,
) -> Result<Vec<Item>, FetchError> {
    info!("[feed] GET {}", source.url);
    let body = http.fetch(&source.url).await?;
    let items = parse_feed_items(source, &body, max_items)
        .map_err(|cause| FetchError::new(&source.url, cause))?;
    info!(source = %source.name, count = items.len(), "[feed] items");
    Ok(items)
}

/// Parse a raw feed document into items for `source`. The bytes go to the
/// parser untouched so the document's own encoding declaration applies.
pub fn parse_feed_items(
    source: &Source,
    body: &[u8],
    max_items: usize,
) -> Result<Vec<Item>, FetchCause> {
    // No synthesized ids: an entry without one must fall back to its link.
    let parser = Builder::new().id_generator(|_, _, _| String::new()).build();
    let feed = parser
        .parse(body)
        .map_err(|e| FetchCause::Parse(e.to_string()))?;
    Ok(feed
        .entries
        .iter()
        .take(max_items)
        .map(|entry| entry_to_item(source, entry))
        .collect())
}

fn entry_to_item(source: &Source, entry: &Entry) -> Item {
    let title = entry.title.as_ref().map(|t| t.content.as_str()).unwrap_or("");
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim())
        .filter(|href| !href.is_empty());
    let id = Some(entry.id.trim()).filter(|id| !id.is_empty());

    let url = link.or(id).unwrap_or(&source.url).to_string();

    let item = Item::new(source, title, url);
    let id_hint = id
        .or(link)
        .map(str::to_string)
        .unwrap_or_else(|| item.title.clone());

    // feed-rs leaves unparseable dates empty, which is what we want here.
    let published_at = entry.published.or(entry.updated);

    item.with_published_at(published_at)
        .with_id_hint(Some(id_hint))
}
