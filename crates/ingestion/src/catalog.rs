//! Remote archive catalog.
//!
//! Enumerates every archive published for an instrument/market by paging
//! through the object store listing, and reduces the keys to dates.

use chrono::NaiveDate;
use liquidation_core::{ArchiveNaming, Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::ObjectStore;

/// Upper bound on listing pages, guarding against a store that never ends.
const MAX_PAGES: usize = 10_000;

/// Lists the dates available on the remote store.
pub struct RemoteCatalog<S: ObjectStore> {
    store: Arc<S>,
    naming: ArchiveNaming,
}

impl<S: ObjectStore> RemoteCatalog<S> {
    /// Create a catalog over an object store.
    pub fn new(store: Arc<S>, naming: ArchiveNaming) -> Self {
        Self { store, naming }
    }

    /// List every published date for `symbol`/`market`.
    ///
    /// The whole listing is consumed before returning; any failure along the
    /// way yields `CatalogUnavailable` since a partial catalog is unusable.
    pub async fn list(&self, symbol: &str, market: &str) -> Result<BTreeSet<NaiveDate>> {
        let prefix = self.naming.listing_prefix(symbol, market);
        let mut dates = BTreeSet::new();
        let mut marker: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .store
                .list_objects(&prefix, marker.as_deref())
                .await
                .map_err(|e| match e {
                    Error::CatalogUnavailable(_) => e,
                    other => Error::catalog(other.to_string()),
                })?;
            pages += 1;

            for key in &page.keys {
                if !self.naming.is_archive(key) {
                    continue;
                }
                match self.naming.extract_date(key) {
                    Some(date) => {
                        dates.insert(date);
                    }
                    None => debug!(key = %key, "Skipping key without a date"),
                }
            }

            let next = match page.continuation() {
                Some(next) => next.to_string(),
                None if page.is_truncated => {
                    return Err(Error::catalog(format!(
                        "listing of {} truncated without a continuation marker",
                        prefix
                    )));
                }
                None => break,
            };

            if marker.as_deref() == Some(next.as_str()) {
                return Err(Error::catalog(format!(
                    "listing of {} repeated marker {}",
                    prefix, next
                )));
            }
            if pages >= MAX_PAGES {
                return Err(Error::catalog(format!(
                    "listing of {} exceeded {} pages",
                    prefix, MAX_PAGES
                )));
            }
            marker = Some(next);
        }

        info!(
            symbol = %symbol,
            market = %market,
            pages = pages,
            dates = dates.len(),
            "Remote catalog listed"
        );
        Ok(dates)
    }
}
