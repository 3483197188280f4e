//! Decides which fetched items count as new for this run.
//!
//! Three mutually exclusive modes, resolved in this order:
//! force-seed, cold-start seeding (only on an empty ledger), steady state.

use chrono::{DateTime, Duration, Utc};
use common::SelectionConfig;
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::error::LedgerError;
use crate::model::Item;
use crate::storage::Ledger;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub force_seed_per_source: usize,
    pub seed_latest_per_source: usize,
    pub since_hours: u32,
}

impl From<&SelectionConfig> for SelectionPolicy {
    fn from(cfg: &SelectionConfig) -> Self {
        Self {
            force_seed_per_source: cfg.force_seed_per_source,
            seed_latest_per_source: cfg.seed_latest_per_source,
            since_hours: cfg.since_hours,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Take the first N per source, mark them seen and report them regardless of history.
    ForceSeed(usize),
    /// Empty ledger: report at most N recent items per source and prime the rest.
    ColdStart(usize),
    SteadyState,
}

/// Recency cutoff, computed once per run. Items without a date always pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyFilter {
    cutoff: Option<DateTime<Utc>>,
}

impl RecencyFilter {
    pub fn new(now: DateTime<Utc>, since_hours: u32) -> Self {
        // A window reaching past the representable range filters nothing.
        let cutoff = (since_hours > 0)
            .then(|| now.checked_sub_signed(Duration::hours(i64::from(since_hours))))
            .flatten();
        Self { cutoff }
    }

    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        self.cutoff
    }

    pub fn passes(&self, item: &Item) -> bool {
        match (self.cutoff, item.published_at) {
            (Some(cutoff), Some(published)) => published >= cutoff,
            _ => true,
        }
    }
}

/// Result of the selection stage.
#[derive(Debug, Clone)]
pub struct Selection {
    pub mode: SelectionMode,
    pub recency: RecencyFilter,
    pub new_items: Vec<Item>,
}

/// Pick the mode for this run. Only the cold-start check touches the ledger.
pub async fn resolve_mode(
    policy: &SelectionPolicy,
    ledger: &Ledger,
) -> Result<SelectionMode, LedgerError> {
    if policy.force_seed_per_source > 0 {
        return Ok(SelectionMode::ForceSeed(policy.force_seed_per_source));
    }
    if policy.seed_latest_per_source > 0 && ledger.is_empty().await? {
        return Ok(SelectionMode::ColdStart(policy.seed_latest_per_source));
    }
    Ok(SelectionMode::SteadyState)
}

/// Select the new items among `fetched`, marking them in the ledger.
///
/// Output order: per-source grouping order (sources in order of first appearance,
/// items in fetch order) for the seeding modes, plain fetch order otherwise.
pub async fn select_new(
    fetched: &[Item],
    ledger: &Ledger,
    policy: &SelectionPolicy,
    now: DateTime<Utc>,
) -> Result<Selection, LedgerError> {
    let recency = RecencyFilter::new(now, policy.since_hours);
    if let Some(cutoff) = recency.cutoff() {
        info!(
            "[new] time filter: last {}h (cutoff {})",
            policy.since_hours,
            cutoff.to_rfc3339()
        );
    }

    let mode = resolve_mode(policy, ledger).await?;
    let mut new_items = Vec::new();

    match mode {
        SelectionMode::ForceSeed(n) => {
            for (_, group) in group_by_source(fetched.iter()) {
                for item in group.into_iter().take(n) {
                    ledger.mark_seen(item).await?;
                    new_items.push(item.clone());
                }
            }
            info!("[new] force-seeded: {}", new_items.len());
        }
        SelectionMode::ColdStart(n) => {
            info!("[new] seeding first {} per source (ledger is empty)", n);
            for (_, group) in group_by_source(fetched.iter().filter(|it| recency.passes(it))) {
                for item in group.into_iter().take(n) {
                    if ledger.check_and_mark(item).await? {
                        new_items.push(item.clone());
                    }
                }
            }
            // Prime the backlog so the next run does not report it.
            let reported: HashSet<String> = new_items.iter().map(Item::identity_key).collect();
            let mut primed = 0usize;
            for item in fetched {
                if !reported.contains(&item.identity_key()) {
                    ledger.mark_seen(item).await?;
                    primed += 1;
                }
            }
            info!("[new] primed {} backlog items without reporting", primed);
        }
        SelectionMode::SteadyState => {
            for item in fetched {
                if recency.passes(item) && ledger.check_and_mark(item).await? {
                    new_items.push(item.clone());
                }
            }
        }
    }

    info!("[new] new items: {}", new_items.len());
    Ok(Selection {
        mode,
        recency,
        new_items,
    })
}

/// Group by source name, keeping first-appearance order of sources and fetch
/// order within each source.
fn group_by_source<'a, I>(items: I) -> Vec<(&'a str, Vec<&'a Item>)>
where
    I: Iterator<Item = &'a Item>,
{
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut groups: Vec<(&'a str, Vec<&'a Item>)> = Vec::new();
    for item in items {
        let slot = *index.entry(item.source.as_str()).or_insert_with(|| {
            groups.push((item.source.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(item);
    }
    groups
}
