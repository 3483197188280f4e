use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::model::Item;

/// Persistent record of every item identity already reported.
///
/// A row in `seen` is the only truth for "reported before". Every operation
/// takes a pooled connection for its own duration and gives it back, so a
/// concurrent run is never locked out for longer than one statement.
///
/// In dry mode nothing is written; keys that would have been inserted are
/// remembered in memory so repeated checks within the run stay accurate.
pub struct Ledger {
    pool: SqlitePool,
    dry_run: bool,
    pending: Mutex<HashSet<String>>,
}

impl Ledger {
    /// Open (creating and migrating if needed) the ledger at `path`.
    pub async fn open(path: &str, dry_run: bool) -> Result<Self, LedgerError> {
        let pool = common::init_db_pool(path)
            .await
            .map_err(|e| LedgerError::Init(format!("{:#}", e)))?;
        common::run_migrations(&pool)
            .await
            .map_err(|e| LedgerError::Init(format!("{:#}", e)))?;
        info!(path, dry_run, "ledger opened");
        Ok(Self::from_pool(pool, dry_run))
    }

    /// Wrap an already-migrated pool.
    pub fn from_pool(pool: SqlitePool, dry_run: bool) -> Self {
        Self {
            pool,
            dry_run,
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Number of persisted records.
    pub async fn count(&self) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM seen")
            .fetch_one(&mut *conn)
            .await?;
        Ok(n)
    }

    /// True iff no records exist. Only used to gate cold-start seeding.
    pub async fn is_empty(&self) -> Result<bool, LedgerError> {
        if self.dry_run && !self.pending_keys().is_empty() {
            return Ok(false);
        }
        Ok(self.count().await? == 0)
    }

    /// Atomically record `item` if its key is unknown. Returns `true` when the
    /// item is new, `false` when it had already been seen.
    ///
    /// Relies on the primary key: the insert either adds the row or does nothing,
    /// so two concurrent callers can never both get `true`.
    pub async fn check_and_mark(&self, item: &Item) -> Result<bool, LedgerError> {
        let key = item.identity_key();

        if self.dry_run {
            if self.contains_key(&key).await? {
                return Ok(false);
            }
            return Ok(self.pending_keys().insert(key));
        }

        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO seen (identity_key, source, title, url, category, published_at, first_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity_key) DO NOTHING
            "#,
        )
        .bind(&key)
        .bind(&item.source)
        .bind(&item.title)
        .bind(&item.url)
        .bind(item.category.as_str())
        .bind(item.published_at)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        let is_new = result.rows_affected() == 1;
        debug!(source = %item.source, key = %key, is_new, "check_and_mark");
        Ok(is_new)
    }

    /// Unconditional, idempotent insert-or-ignore.
    pub async fn mark_seen(&self, item: &Item) -> Result<(), LedgerError> {
        let key = item.identity_key();

        if self.dry_run {
            self.pending_keys().insert(key);
            return Ok(());
        }

        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO seen (identity_key, source, title, url, category, published_at, first_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key)
        .bind(&item.source)
        .bind(&item.title)
        .bind(&item.url)
        .bind(item.category.as_str())
        .bind(item.published_at)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Whether a record exists for `key`. Read-only.
    pub async fn contains_key(&self, key: &str) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM seen WHERE identity_key = ?")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(found.is_some())
    }

    /// Delete every record. Returns how many were removed.
    pub async fn reset(&self) -> Result<u64, LedgerError> {
        self.pending_keys().clear();
        if self.dry_run {
            return Ok(0);
        }
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query("DELETE FROM seen").execute(&mut *conn).await?;
        info!(removed = result.rows_affected(), "ledger reset");
        Ok(result.rows_affected())
    }

    /// Close the underlying pool, flushing the WAL.
    pub async fn close(self) {
        self.pool.close().await;
    }

    fn pending_keys(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Source};

    fn item(id: &str) -> Item {
        let src = Source::feed("Acme", Category::Blog, "https://acme.example/feed");
        Item::new(&src, &format!("Post {}", id), format!("https://acme.example/{}", id))
            .with_id_hint(Some(id.to_string()))
    }

    async fn open(dir: &tempfile::TempDir, dry_run: bool) -> Ledger {
        let path = dir.path().join("ledger.db");
        Ledger::open(&path.to_string_lossy(), dry_run)
            .await
            .expect("open ledger")
    }

    #[tokio::test]
    async fn check_and_mark_is_idempotent_across_restarts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = open(&dir, false).await;
        assert!(ledger.is_empty().await.unwrap());

        assert!(ledger.check_and_mark(&item("1")).await.unwrap());
        assert!(!ledger.check_and_mark(&item("1")).await.unwrap());
        assert!(!ledger.is_empty().await.unwrap());
        ledger.close().await;

        let reopened = open(&dir, false).await;
        assert!(!reopened.check_and_mark(&item("1")).await.unwrap());
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_identity_with_different_fields_is_a_duplicate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = open(&dir, false).await;
        assert!(ledger.check_and_mark(&item("7")).await.unwrap());

        let mut edited = item("7");
        edited.title = "Edited".into();
        edited.url = "https://acme.example/moved".into();
        assert!(!ledger.check_and_mark(&edited).await.unwrap());
    }

    #[tokio::test]
    async fn mark_seen_is_idempotent_and_blocks_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = open(&dir, false).await;
        ledger.mark_seen(&item("a")).await.unwrap();
        ledger.mark_seen(&item("a")).await.unwrap();
        assert_eq!(ledger.count().await.unwrap(), 1);
        assert!(!ledger.check_and_mark(&item("a")).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_marks_yield_a_single_winner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = open(&dir, false).await;
        let target = item("race");

        let results =
            futures::future::join_all((0..8).map(|_| ledger.check_and_mark(&target))).await;
        let winners = results
            .into_iter()
            .map(|r| r.expect("no storage error"))
            .filter(|is_new| *is_new)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dry_run_reports_accurately_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let wet = open(&dir, false).await;
            wet.check_and_mark(&item("old")).await.unwrap();
            wet.close().await;
        }

        let dry = open(&dir, true).await;
        assert!(dry.is_dry_run());
        assert!(!dry.check_and_mark(&item("old")).await.unwrap());
        assert!(dry.check_and_mark(&item("fresh")).await.unwrap());
        assert!(!dry.check_and_mark(&item("fresh")).await.unwrap());
        dry.mark_seen(&item("other")).await.unwrap();
        assert_eq!(dry.count().await.unwrap(), 1);
        dry.close().await;

        let wet = open(&dir, false).await;
        assert!(wet.check_and_mark(&item("fresh")).await.unwrap());
    }

    #[tokio::test]
    async fn reset_empties_the_ledger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = open(&dir, false).await;
        ledger.check_and_mark(&item("1")).await.unwrap();
        ledger.check_and_mark(&item("2")).await.unwrap();
        assert_eq!(ledger.reset().await.unwrap(), 2);
        assert!(ledger.is_empty().await.unwrap());
    }
}
