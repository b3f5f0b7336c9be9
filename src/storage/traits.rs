use crate::model::{Direction, EnrichedChange, Observation, StorageError, StreakRecord};

/// Read side of the time-series store: the catalog of regions/products and
/// their monthly observation series. The recompute engine only ever consumes
/// this; whatever populates it lives outside this crate.
#[async_trait::async_trait]
pub trait SeriesStore: Send + Sync {
    async fn list_regions(&self) -> Result<Vec<String>, StorageError>;

    async fn list_products(&self, region: &str) -> Result<Vec<String>, StorageError>;

    /// The full observation series for one (product, region), sorted
    /// ascending by period. May be empty.
    async fn get_series(&self, product: &str, region: &str)
        -> Result<Vec<Observation>, StorageError>;

    /// Point lookup for one reference month.
    async fn get_observation(
        &self,
        product: &str,
        region: &str,
        period: &str,
    ) -> Result<Option<Observation>, StorageError>;
}

/// Store for derived records. Writes are idempotent upserts keyed by
/// (product, region); the read queries are pass-throughs for the serving
/// layer and add no derivation of their own.
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    async fn upsert_change(&self, rec: &EnrichedChange) -> Result<(), StorageError>;

    async fn upsert_streak(&self, rec: &StreakRecord) -> Result<(), StorageError>;

    /// Removes the stored streak for this key, if any. Called whenever a
    /// recompute finds no active streak, so stale runs never linger.
    async fn delete_streak(&self, product: &str, region: &str) -> Result<(), StorageError>;

    async fn get_change(
        &self,
        product: &str,
        region: &str,
    ) -> Result<Option<EnrichedChange>, StorageError>;

    async fn get_streak(
        &self,
        product: &str,
        region: &str,
    ) -> Result<Option<StreakRecord>, StorageError>;

    /// Top `limit` changes in one direction for a region, steepest percent
    /// first (rows without a percent sort last).
    async fn top_changes(
        &self,
        region: &str,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<EnrichedChange>, StorageError>;

    /// All current streaks for a region, longest first.
    async fn current_streaks(&self, region: &str) -> Result<Vec<StreakRecord>, StorageError>;

    /// The full per-product change list for a region, YoY fields included.
    async fn region_changes(&self, region: &str) -> Result<Vec<EnrichedChange>, StorageError>;
}
