//! Canonical item model shared by every pipeline stage.

use chrono::{DateTime, Utc};
use common::{SelectorsConfig, SourceConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Title used when a source gives an item without one.
pub const NO_TITLE: &str = "(no title)";

/// Closed set of content categories a source can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Blog,
    Release,
    Event,
    Webinar,
    News,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Blog => "blog",
            Category::Release => "release",
            Category::Event => "event",
            Category::Webinar => "webinar",
            Category::News => "news",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blog" => Ok(Category::Blog),
            "release" => Ok(Category::Release),
            "event" => Ok(Category::Event),
            "webinar" => Ok(Category::Webinar),
            "news" => Ok(Category::News),
            other => Err(other.to_string()),
        }
    }
}

/// CSS selectors for pulling items out of an HTML listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlSelectors {
    /// Matches one node per item.
    pub item: String,
    /// Matches the anchor inside an item node, when the item node is not itself a link.
    pub title: String,
    /// Attribute holding the link target, usually `href`.
    pub link_attr: String,
    /// Optional node holding the publish date, looked up inside the item node.
    pub date: Option<String>,
}

impl From<&SelectorsConfig> for HtmlSelectors {
    fn from(cfg: &SelectorsConfig) -> Self {
        Self {
            item: cfg.item.clone(),
            title: cfg.title.clone(),
            link_attr: cfg.link_attr.clone(),
            date: cfg.date.clone(),
        }
    }
}

/// How a source is read. Selectors only exist on the HTML variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Feed,
    Html(HtmlSelectors),
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Html(_) => "html",
        }
    }
}

/// A configured origin. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub kind: SourceKind,
    pub category: Category,
    pub url: String,
}

impl Source {
    pub fn feed(name: impl Into<String>, category: Category, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Feed,
            category,
            url: url.into(),
        }
    }

    pub fn html(
        name: impl Into<String>,
        category: Category,
        url: impl Into<String>,
        selectors: HtmlSelectors,
    ) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Html(selectors),
            category,
            url: url.into(),
        }
    }

    /// Validate one raw config entry. `index` is only used in error messages.
    pub fn from_config(index: usize, cfg: &SourceConfig) -> Result<Self, ConfigError> {
        let name = cfg.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyName { index });
        }

        let category = cfg
            .category
            .parse::<Category>()
            .map_err(|category| ConfigError::UnknownCategory {
                name: name.clone(),
                category,
            })?;

        let parsed = url::Url::parse(cfg.url.trim()).map_err(|e| ConfigError::InvalidUrl {
            name: name.clone(),
            url: cfg.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                name,
                url: cfg.url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let kind = match (cfg.kind.trim().to_ascii_lowercase().as_str(), &cfg.selectors) {
            ("feed" | "rss" | "atom", None) => SourceKind::Feed,
            ("feed" | "rss" | "atom", Some(_)) => {
                return Err(ConfigError::UnexpectedSelectors { name })
            }
            ("html", Some(selectors)) => {
                let selectors = HtmlSelectors::from(selectors);
                let mut to_check = vec![&selectors.item, &selectors.title];
                to_check.extend(selectors.date.as_ref());
                for selector in to_check {
                    if scraper::Selector::parse(selector).is_err() {
                        return Err(ConfigError::InvalidSelector {
                            name,
                            selector: selector.clone(),
                        });
                    }
                }
                SourceKind::Html(selectors)
            }
            ("html", None) => return Err(ConfigError::MissingSelectors { name }),
            (other, _) => {
                return Err(ConfigError::UnknownKind {
                    name,
                    kind: other.to_string(),
                })
            }
        };

        Ok(Self {
            name,
            kind,
            category,
            url: cfg.url.trim().to_string(),
        })
    }
}

/// Validate the whole configured source list, keeping its order.
pub fn sources_from_config(configs: &[SourceConfig]) -> Result<Vec<Source>, ConfigError> {
    let mut names = HashSet::new();
    let mut sources = Vec::with_capacity(configs.len());
    for (index, cfg) in configs.iter().enumerate() {
        let source = Source::from_config(index, cfg)?;
        if !names.insert(source.name.clone()) {
            return Err(ConfigError::DuplicateName { name: source.name });
        }
        sources.push(source);
    }
    Ok(sources)
}

/// One observed piece of content. Created fresh on every fetch and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub source: String,
    pub category: Category,
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub id_hint: Option<String>,
}

impl Item {
    /// Build an item for `source`. An empty title falls back to [`NO_TITLE`].
    pub fn new(source: &Source, title: &str, url: impl Into<String>) -> Self {
        let title = title.trim();
        Self {
            source: source.name.clone(),
            category: source.category,
            title: if title.is_empty() {
                NO_TITLE.to_string()
            } else {
                title.to_string()
            },
            url: url.into(),
            published_at: None,
            id_hint: None,
        }
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_id_hint(mut self, id_hint: Option<String>) -> Self {
        self.id_hint = id_hint.filter(|s| !s.trim().is_empty());
        self
    }

    /// Dedup key for this item. See [`identity_key`].
    pub fn identity_key(&self) -> String {
        identity_key(
            &self.source,
            self.id_hint.as_deref(),
            &self.url,
            &self.title,
        )
    }
}

/// SHA-256 over `source` and the first non-empty of `id_hint`, `url`, `title`.
///
/// Parts are trimmed and joined with U+0001, so the source always
/// participates and two sources can never share a key.
pub fn identity_key(source: &str, id_hint: Option<&str>, url: &str, title: &str) -> String {
    let discriminator = [id_hint.unwrap_or(""), url, title]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("");

    let parts: Vec<&str> = [source.trim(), discriminator]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(parts.join("\u{0001}").as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(name: &str) -> Source {
        Source::feed(name, Category::Blog, "https://example.com/feed")
    }

    fn raw(name: &str, kind: &str, url: &str, selectors: Option<SelectorsConfig>) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            kind: kind.to_string(),
            category: "news".to_string(),
            url: url.to_string(),
            selectors,
        }
    }

    fn selectors() -> SelectorsConfig {
        SelectorsConfig {
            item: "article".to_string(),
            title: "h2 a".to_string(),
            link_attr: "href".to_string(),
            date: None,
        }
    }

    #[test]
    fn same_id_hint_gives_same_key_regardless_of_title_and_url() {
        let a = Item::new(&src("Acme"), "First title", "https://a.example/1")
            .with_id_hint(Some("urn:post:1".into()));
        let b = Item::new(&src("Acme"), "Edited title", "https://a.example/1?utm=x")
            .with_id_hint(Some("urn:post:1".into()));
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn changing_source_changes_key() {
        let a = Item::new(&src("Acme"), "Same", "https://same.example/")
            .with_id_hint(Some("id-1".into()));
        let b = Item::new(&src("Globex"), "Same", "https://same.example/")
            .with_id_hint(Some("id-1".into()));
        assert_ne!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn key_collapses_to_url_then_title() {
        let with_url = identity_key("Acme", None, "https://a.example/x", "Title");
        assert_eq!(with_url, identity_key("Acme", Some("  "), "https://a.example/x", "Other"));

        let title_only = identity_key("Acme", None, "", "Title");
        assert_eq!(title_only, identity_key("Acme", None, "  ", "Title"));
        assert_ne!(title_only, with_url);
    }

    #[test]
    fn key_is_lowercase_hex_sha256() {
        let key = identity_key("Acme", Some("1"), "", "");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_title_falls_back_to_placeholder() {
        let item = Item::new(&src("Acme"), "   ", "https://a.example/");
        assert_eq!(item.title, NO_TITLE);
        assert_eq!(item.category, Category::Blog);
    }

    #[test]
    fn html_source_requires_selectors() {
        let err = Source::from_config(0, &raw("Page", "html", "https://a.example/", None))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSelectors { .. }));

        let err = Source::from_config(
            0,
            &raw("Feed", "feed", "https://a.example/", Some(selectors())),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnexpectedSelectors { .. }));

        let ok = Source::from_config(
            0,
            &raw("Page", "html", "https://a.example/", Some(selectors())),
        )
        .expect("valid html source");
        assert_eq!(ok.kind.label(), "html");
    }

    #[test]
    fn rss_is_accepted_as_feed() {
        let source =
            Source::from_config(0, &raw("Feed", "RSS", "https://a.example/rss", None)).unwrap();
        assert_eq!(source.kind, SourceKind::Feed);
        assert_eq!(source.category, Category::News);
    }

    #[test]
    fn rejects_bad_definitions() {
        let err = Source::from_config(0, &raw("X", "json", "https://a.example/", None)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKind { .. }));

        let err = Source::from_config(0, &raw("X", "feed", "ftp://a.example/", None)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let err = Source::from_config(0, &raw("X", "feed", "not a url", None)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let mut bad_category = raw("X", "feed", "https://a.example/", None);
        bad_category.category = "podcast".into();
        let err = Source::from_config(0, &bad_category).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCategory { .. }));

        let mut bad_selector = selectors();
        bad_selector.item = "li[".into();
        let err = Source::from_config(
            0,
            &raw("X", "html", "https://a.example/", Some(bad_selector)),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelector { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let configs = vec![
            raw("Acme", "feed", "https://a.example/1", None),
            raw("Acme", "feed", "https://a.example/2", None),
        ];
        let err = sources_from_config(&configs).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
    }
}
