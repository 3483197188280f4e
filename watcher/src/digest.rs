use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::model::{Category, Item};

/// Product name used in digest subjects.
pub const PRODUCT_NAME: &str = "Competitor Watcher";

/// Turns a group of new items into one bullet line per item.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, items: &[Item]) -> anyhow::Result<Vec<String>>;
}

/// Plain `[title](url)` line per item. Always available, never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkSummarizer;

impl LinkSummarizer {
    pub fn bullets(items: &[Item]) -> Vec<String> {
        items
            .iter()
            .map(|it| format!("[{}]({})", it.title, it.url))
            .collect()
    }
}

#[async_trait]
impl Summarizer for LinkSummarizer {
    async fn summarize(&self, items: &[Item]) -> anyhow::Result<Vec<String>> {
        Ok(Self::bullets(items))
    }
}

/// New items of one `source · category` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSection {
    pub key: String,
    pub source: String,
    pub category: Category,
    pub items: Vec<Item>,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Group(GroupSection),
    /// Placeholder when nothing is new. Carries the recency window, if one was active.
    NoUpdates { since_hours: Option<u32> },
}

impl Section {
    pub fn heading(&self) -> String {
        match self {
            Section::Group(g) => format!("{} ({})", g.key, g.items.len()),
            Section::NoUpdates { .. } => "No updates".to_string(),
        }
    }
}

/// Structured digest handed to delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub item_count: usize,
    pub sections: Vec<Section>,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }
}

/// Text of the no-updates placeholder.
pub fn no_updates_message(since_hours: Option<u32>) -> String {
    match since_hours {
        Some(h) => format!("No new updates in the last {} hours.", h),
        None => "No new updates today.".to_string(),
    }
}

/// Subject of an empty digest. Always starts with the same fixed text; a recency
/// window, when active, is appended so the two cases can be told apart.
pub fn no_updates_subject(since_hours: Option<u32>) -> String {
    match since_hours {
        Some(h) => format!("{}: No new updates (last {}h)", PRODUCT_NAME, h),
        None => format!("{}: No new updates", PRODUCT_NAME),
    }
}

pub fn digest_subject(date: NaiveDate, count: usize) -> String {
    format!(
        "{} · {} · {} update(s)",
        PRODUCT_NAME,
        date.format("%Y-%m-%d"),
        count
    )
}

/// Group key used for sorting and headings.
pub fn group_key(item: &Item) -> String {
    format!("{} · {}", item.source, item.category)
}

/// Group new items by `source · category` (sorted by that key) and render each
/// group's bullets through `summarizer`, falling back to plain links when it fails.
pub async fn assemble(
    new_items: &[Item],
    summarizer: &dyn Summarizer,
    since_hours: u32,
    date: NaiveDate,
) -> Digest {
    if new_items.is_empty() {
        let window = (since_hours > 0).then_some(since_hours);
        return Digest {
            subject: no_updates_subject(window),
            item_count: 0,
            sections: vec![Section::NoUpdates {
                since_hours: window,
            }],
        };
    }

    let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in new_items {
        groups.entry(group_key(item)).or_default().push(item.clone());
    }

    let mut sections = Vec::with_capacity(groups.len());
    for (key, items) in groups {
        let bullets = match summarizer.summarize(&items).await {
            Ok(bullets) if !bullets.is_empty() => bullets,
            Ok(_) => {
                warn!(group = %key, "summarizer returned nothing, using plain links");
                LinkSummarizer::bullets(&items)
            }
            Err(e) => {
                warn!(group = %key, "summarizer failed: {}, using plain links", e);
                LinkSummarizer::bullets(&items)
            }
        };
        let first = &items[0];
        sections.push(Section::Group(GroupSection {
            key,
            source: first.source.clone(),
            category: first.category,
            bullets,
            items,
        }));
    }

    info!(groups = sections.len(), items = new_items.len(), "digest assembled");
    Digest {
        subject: digest_subject(date, new_items.len()),
        item_count: new_items.len(),
        sections,
    }
}
