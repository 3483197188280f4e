use chrono::{DateTime, Utc};
use common::Config;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::digest::{self, Digest, Summarizer};
use crate::error::{FetchError, Result};
use crate::http::HttpAccessor;
use crate::ingestion;
use crate::model::{sources_from_config, Item, Source};
use crate::selection::{self, SelectionMode, SelectionPolicy};
use crate::storage::Ledger;

/// A source that could not be fetched this run.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: FetchError,
}

/// Everything fetched this run, in source order, plus the sources that failed.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<Item>,
    pub failures: Vec<SourceFailure>,
}

/// Typed result of every stage of one run.
#[derive(Debug)]
pub struct RunReport {
    pub sources: Vec<Source>,
    pub fetch: FetchOutcome,
    pub mode: SelectionMode,
    pub new_items: Vec<Item>,
    pub digest: Digest,
}

/// Fetch every source with at most `concurrency` requests in flight.
///
/// Results are collected in source order and each source keeps its own item
/// order. A failing source is logged and recorded; it never aborts the others.
pub async fn fetch_all(
    http: &HttpAccessor,
    sources: &[Source],
    max_items: usize,
    concurrency: usize,
) -> FetchOutcome {
    let results: Vec<_> = stream::iter(sources)
        .map(|source| async move {
            (source, ingestion::fetch_source(http, source, max_items).await)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = FetchOutcome::default();
    for (source, result) in results {
        match result {
            Ok(items) => outcome.items.extend(items),
            Err(error) => {
                warn!("[{}] skip {}: {}", source.kind.label(), source.name, error);
                outcome.failures.push(SourceFailure {
                    source: source.name.clone(),
                    error,
                });
            }
        }
    }
    info!(
        items = outcome.items.len(),
        failed_sources = outcome.failures.len(),
        "[fetch] done"
    );
    outcome
}

/// One full run: load sources, fetch, select new items, assemble the digest.
///
/// Configuration and ledger errors abort the run; fetch errors only drop the
/// affected source.
pub async fn run(
    config: &Config,
    ledger: &Ledger,
    summarizer: &dyn Summarizer,
) -> Result<RunReport> {
    run_at(config, ledger, summarizer, Utc::now()).await
}

/// [`run`] with an explicit clock, used for the recency cutoff and the digest date.
pub async fn run_at(
    config: &Config,
    ledger: &Ledger,
    summarizer: &dyn Summarizer,
    now: DateTime<Utc>,
) -> Result<RunReport> {
    let sources = sources_from_config(&config.sources)?;
    let http = HttpAccessor::new(&config.http)?;
    let policy = SelectionPolicy::from(&config.selection);
    info!(
        sources = sources.len(),
        dry_run = ledger.is_dry_run(),
        "run started"
    );

    let fetch = fetch_all(
        &http,
        &sources,
        config.selection.max_items_per_source,
        config.http.concurrency,
    )
    .await;

    let selection = selection::select_new(&fetch.items, ledger, &policy, now).await?;

    let digest = digest::assemble(
        &selection.new_items,
        summarizer,
        policy.since_hours,
        now.date_naive(),
    )
    .await;

    Ok(RunReport {
        sources,
        fetch,
        mode: selection.mode,
        new_items: selection.new_items,
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::LinkSummarizer;
    use crate::error::WatchError;
    use common::SourceConfig;

    #[tokio::test]
    async fn invalid_sources_abort_before_fetching() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = Ledger::open(&dir.path().join("l.db").to_string_lossy(), false)
            .await
            .expect("ledger");

        let mut config = Config::default();
        config.sources = vec![
            SourceConfig {
                name: "Acme".to_string(),
                kind: "feed".to_string(),
                category: "blog".to_string(),
                url: "https://acme.example/feed".to_string(),
                selectors: None,
            },
            SourceConfig {
                name: "Acme".to_string(),
                kind: "feed".to_string(),
                category: "news".to_string(),
                url: "https://acme.example/news".to_string(),
                selectors: None,
            },
        ];

        let err = run(&config, &ledger, &LinkSummarizer).await.unwrap_err();
        assert!(matches!(err, WatchError::Config(_)));
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn no_sources_still_yields_a_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = Ledger::open(&dir.path().join("l.db").to_string_lossy(), false)
            .await
            .expect("ledger");

        let report = run(&Config::default(), &ledger, &LinkSummarizer)
            .await
            .expect("run");
        assert!(report.new_items.is_empty());
        assert!(report.digest.is_empty());
        assert_eq!(report.mode, SelectionMode::SteadyState);
    }
}
