//! Search index refresh extension point.
//!
//! The dashboard has no search backend of its own yet; the periodic refresh job
//! calls whatever [`SearchIndexer`] it was built with.

use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexUpdateStats {
    pub documents_indexed: usize,
}

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    fn name(&self) -> &str;

    /// Brings the index up to date with its sources.
    async fn update_index(&self) -> Result<IndexUpdateStats>;
}

/// Indexer used when search is not configured. Does nothing.
#[derive(Debug, Default)]
pub struct NoOpSearchIndexer;

#[async_trait]
impl SearchIndexer for NoOpSearchIndexer {
    fn name(&self) -> &str {
        "noop"
    }

    async fn update_index(&self) -> Result<IndexUpdateStats> {
        Ok(IndexUpdateStats::default())
    }
}
