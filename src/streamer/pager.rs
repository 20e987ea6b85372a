//! Pull-based paging over a result scope.
//!
//! The total is counted once up front, then each [`Pager::next_page`] call
//! fetches one page inside a fresh transaction. The page hands its
//! transaction to the caller so follow-up lookups for that page run in it.

use crate::db::{ComponentResult, Database, StudyResult};
use crate::error::{Error, Result};
use crate::types::ResultScope;
use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::marker::PhantomData;
use tracing::debug;

/// An entity that can be counted and paged by scope
#[async_trait]
pub trait Paged: Sized + Send {
    /// Count the entities in a scope
    async fn count(conn: &mut SqliteConnection, scope: &ResultScope) -> Result<u64>;

    /// Fetch one page
    async fn fetch(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Self>>;
}

#[async_trait]
impl Paged for StudyResult {
    async fn count(conn: &mut SqliteConnection, scope: &ResultScope) -> Result<u64> {
        Database::count_study_results(conn, scope).await
    }

    async fn fetch(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Self>> {
        Database::find_study_results(conn, scope, offset, limit).await
    }
}

#[async_trait]
impl Paged for ComponentResult {
    async fn count(conn: &mut SqliteConnection, scope: &ResultScope) -> Result<u64> {
        Database::count_component_results(conn, scope).await
    }

    async fn fetch(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Self>> {
        Database::find_component_results(conn, scope, offset, limit).await
    }
}

/// One fetched page and the transaction it was read in
pub struct Page<T> {
    /// Transaction for lookups belonging to this page
    pub tx: Transaction<'static, Sqlite>,
    /// The entities, in repository order
    pub items: Vec<T>,
}

/// Finish a page's transaction
pub async fn close_page(tx: Transaction<'static, Sqlite>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| Error::query("Failed to close page transaction", e))
}

/// Lazy, finite, non-restartable sequence of pages
pub struct Pager<'a, T> {
    db: &'a Database,
    scope: &'a ResultScope,
    page_size: usize,
    offset: u64,
    total: u64,
    fetches: usize,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: Paged> Pager<'a, T> {
    /// Count the scope and position before the first page
    pub async fn open(db: &'a Database, scope: &'a ResultScope, page_size: usize) -> Result<Self> {
        let mut tx = db.begin().await?;
        let total = T::count(&mut tx, scope).await?;
        close_page(tx).await?;

        debug!(?scope, total, page_size, "opened result pager");

        Ok(Self {
            db,
            scope,
            page_size: page_size.max(1),
            offset: 0,
            total,
            fetches: 0,
            _entity: PhantomData,
        })
    }

    /// Number of entities counted when the pager was opened
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of pages fetched so far
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Fetch the next page, or `None` once the counted total is covered
    ///
    /// A page that comes back empty (rows removed since counting) also ends
    /// the sequence.
    pub async fn next_page(&mut self) -> Result<Option<Page<T>>> {
        if self.offset >= self.total {
            return Ok(None);
        }

        let mut tx = self.db.begin().await?;
        let items = T::fetch(&mut tx, self.scope, self.offset, self.page_size).await?;
        self.fetches += 1;
        self.offset += self.page_size as u64;

        if items.is_empty() {
            close_page(tx).await?;
            self.offset = self.total;
            return Ok(None);
        }

        Ok(Some(Page { tx, items }))
    }
}
