//! Batch recomputation of derived records over the whole catalog.
//!
//! Per-product work is a pure function of that product's own series, so
//! products fan out through a bounded `buffer_unordered` pool. Every write
//! is an idempotent upsert keyed by (product, region): recomputing over
//! unchanged observations yields the same derived values, and dropping the
//! future mid-flight only leaves some products un-refreshed.

use crate::analyzer::{compute_change, compute_streak, enrich_yoy};
use crate::model::{SkipReason, StorageError};
use crate::storage::{ResultStore, SeriesStore};
use crate::utils::year_ago_period;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of recomputing one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSummary {
    pub region: String,
    /// Products whose ChangeRecord was written.
    pub processed_count: usize,
    /// Products skipped for expected per-product reasons.
    pub skipped_count: usize,
}

/// Per-region line of a full-catalog run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOutcome {
    pub region: String,
    pub processed_count: usize,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregate result of [`Recomputer::recompute_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeReport {
    pub total_processed: usize,
    pub per_region: Vec<RegionOutcome>,
}

enum ProductOutcome {
    Processed,
    Skipped(SkipReason),
}

/// Drives the calculators over every product of one or more regions and
/// owns all writes to the result store.
pub struct Recomputer<S> {
    storage: Arc<S>,
    max_parallel: usize,
}

impl<S> Recomputer<S>
where
    S: SeriesStore + ResultStore,
{
    /// `max_parallel` bounds the number of products in flight at once; it
    /// caps concurrent load on the stores and comes from configuration.
    pub fn new(storage: Arc<S>, max_parallel: usize) -> Self {
        Self {
            storage,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Recomputes change, streak and year-over-year records for every
    /// product of `region`.
    ///
    /// Expected per-product conditions (too few points, unusable values)
    /// are logged and skipped without touching stored records. Store
    /// failures abort the region and propagate; records already written
    /// stay valid.
    pub async fn recompute_region(&self, region: &str) -> Result<RegionSummary, StorageError> {
        let products = self.storage.list_products(region).await?;
        info!(region, products = products.len(), "recomputing region");

        let results: Vec<Result<ProductOutcome, StorageError>> =
            futures::stream::iter(products.into_iter())
                .map(|product| self.process_product(region, product))
                .buffer_unordered(self.max_parallel)
                .collect()
                .await;

        let mut processed_count = 0;
        let mut skipped_count = 0;
        for result in results {
            match result? {
                ProductOutcome::Processed => processed_count += 1,
                ProductOutcome::Skipped(_) => skipped_count += 1,
            }
        }

        info!(region, processed_count, skipped_count, "region complete");
        Ok(RegionSummary {
            region: region.to_string(),
            processed_count,
            skipped_count,
        })
    }

    /// Recomputes every known region (or only `regions`, when non-empty).
    ///
    /// One region's failure never blocks the others; each region reports
    /// its own success flag and error text in the aggregate.
    pub async fn recompute_all(&self, regions: &[String]) -> Result<RecomputeReport, StorageError> {
        let regions = if regions.is_empty() {
            self.storage.list_regions().await?
        } else {
            regions.to_vec()
        };
        info!(regions = regions.len(), "recomputing all regions");

        let mut per_region = Vec::with_capacity(regions.len());
        let mut total_processed = 0;
        for region in regions {
            match self.recompute_region(&region).await {
                Ok(summary) => {
                    total_processed += summary.processed_count;
                    per_region.push(RegionOutcome {
                        region,
                        processed_count: summary.processed_count,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    error!(region = %region, error = %e, "region recompute failed");
                    per_region.push(RegionOutcome {
                        region,
                        processed_count: 0,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(total_processed, "recompute complete");
        Ok(RecomputeReport {
            total_processed,
            per_region,
        })
    }

    async fn process_product(
        &self,
        region: &str,
        product: String,
    ) -> Result<ProductOutcome, StorageError> {
        let series = self.storage.get_series(&product, region).await?;

        let change = match compute_change(&series) {
            Ok(change) => change,
            Err(reason) => {
                warn!(product = %product, region, %reason, "skipping product");
                return Ok(ProductOutcome::Skipped(reason));
            }
        };

        match compute_streak(&series) {
            Some(streak) => self.storage.upsert_streak(&streak).await?,
            // No active streak: make sure no stale one lingers.
            None => self.storage.delete_streak(&product, region).await?,
        }

        let year_ago_obs = match year_ago_period(&change.current_period) {
            Some(period) => {
                self.storage
                    .get_observation(&product, region, &period)
                    .await?
            }
            None => None,
        };
        let enriched = enrich_yoy(change, year_ago_obs.as_ref());
        self.storage.upsert_change(&enriched).await?;

        Ok(ProductOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Direction, EnrichedChange, Observation, StreakPoint, StreakRecord,
    };
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory double for both store ports; `failing_region` simulates a
    /// store outage scoped to one region.
    #[derive(Default)]
    struct MemoryStore {
        observations: Vec<Observation>,
        changes: Mutex<HashMap<(String, String), EnrichedChange>>,
        streaks: Mutex<HashMap<(String, String), StreakRecord>>,
        failing_region: Option<String>,
    }

    impl MemoryStore {
        fn with_series(series: &[(&str, &str, &[f64])]) -> Self {
            let mut observations = Vec::new();
            for (product, region, values) in series {
                for (i, value) in values.iter().enumerate() {
                    observations.push(Observation {
                        product: product.to_string(),
                        region: region.to_string(),
                        period: format!("2023-{:02}", i + 1),
                        value: Some(*value),
                    });
                }
            }
            Self {
                observations,
                ..Default::default()
            }
        }

        fn check_region(&self, region: &str) -> Result<(), StorageError> {
            if self.failing_region.as_deref() == Some(region) {
                Err(StorageError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl SeriesStore for MemoryStore {
        async fn list_regions(&self) -> Result<Vec<String>, StorageError> {
            let mut regions: Vec<String> = self
                .observations
                .iter()
                .map(|o| o.region.clone())
                .collect();
            regions.sort();
            regions.dedup();
            Ok(regions)
        }

        async fn list_products(&self, region: &str) -> Result<Vec<String>, StorageError> {
            self.check_region(region)?;
            let mut products: Vec<String> = self
                .observations
                .iter()
                .filter(|o| o.region == region)
                .map(|o| o.product.clone())
                .collect();
            products.sort();
            products.dedup();
            Ok(products)
        }

        async fn get_series(
            &self,
            product: &str,
            region: &str,
        ) -> Result<Vec<Observation>, StorageError> {
            self.check_region(region)?;
            let mut series: Vec<Observation> = self
                .observations
                .iter()
                .filter(|o| o.product == product && o.region == region)
                .cloned()
                .collect();
            series.sort_by(|a, b| a.period.cmp(&b.period));
            Ok(series)
        }

        async fn get_observation(
            &self,
            product: &str,
            region: &str,
            period: &str,
        ) -> Result<Option<Observation>, StorageError> {
            self.check_region(region)?;
            Ok(self
                .observations
                .iter()
                .find(|o| o.product == product && o.region == region && o.period == period)
                .cloned())
        }
    }

    #[async_trait::async_trait]
    impl ResultStore for MemoryStore {
        async fn upsert_change(&self, rec: &EnrichedChange) -> Result<(), StorageError> {
            self.check_region(&rec.change.region)?;
            self.changes.lock().unwrap().insert(
                (rec.change.product.clone(), rec.change.region.clone()),
                rec.clone(),
            );
            Ok(())
        }

        async fn upsert_streak(&self, rec: &StreakRecord) -> Result<(), StorageError> {
            self.check_region(&rec.region)?;
            self.streaks
                .lock()
                .unwrap()
                .insert((rec.product.clone(), rec.region.clone()), rec.clone());
            Ok(())
        }

        async fn delete_streak(&self, product: &str, region: &str) -> Result<(), StorageError> {
            self.check_region(region)?;
            self.streaks
                .lock()
                .unwrap()
                .remove(&(product.to_string(), region.to_string()));
            Ok(())
        }

        async fn get_change(
            &self,
            product: &str,
            region: &str,
        ) -> Result<Option<EnrichedChange>, StorageError> {
            Ok(self
                .changes
                .lock()
                .unwrap()
                .get(&(product.to_string(), region.to_string()))
                .cloned())
        }

        async fn get_streak(
            &self,
            product: &str,
            region: &str,
        ) -> Result<Option<StreakRecord>, StorageError> {
            Ok(self
                .streaks
                .lock()
                .unwrap()
                .get(&(product.to_string(), region.to_string()))
                .cloned())
        }

        async fn top_changes(
            &self,
            _region: &str,
            _direction: Direction,
            _limit: usize,
        ) -> Result<Vec<EnrichedChange>, StorageError> {
            unimplemented!("not exercised by orchestrator tests")
        }

        async fn current_streaks(
            &self,
            _region: &str,
        ) -> Result<Vec<StreakRecord>, StorageError> {
            unimplemented!("not exercised by orchestrator tests")
        }

        async fn region_changes(
            &self,
            _region: &str,
        ) -> Result<Vec<EnrichedChange>, StorageError> {
            unimplemented!("not exercised by orchestrator tests")
        }
    }

    fn recomputer(store: MemoryStore) -> (Arc<MemoryStore>, Recomputer<MemoryStore>) {
        let store = Arc::new(store);
        (store.clone(), Recomputer::new(store, 4))
    }

    #[tokio::test]
    async fn writes_change_and_streak_for_a_clean_series() {
        let (store, recomputer) = recomputer(MemoryStore::with_series(&[(
            "Milk",
            "Ontario",
            &[2.00, 2.10, 2.20, 2.30],
        )]));

        let summary = recomputer.recompute_region("Ontario").await.unwrap();
        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.skipped_count, 0);

        let change = store.get_change("Milk", "Ontario").await.unwrap().unwrap();
        assert!((change.change.change - 0.10).abs() < 1e-9);

        let streak = store.get_streak("Milk", "Ontario").await.unwrap().unwrap();
        assert_eq!(streak.direction, Direction::Increase);
        assert_eq!(streak.length, 4);
    }

    #[tokio::test]
    async fn skips_are_counted_and_leave_no_records() {
        // 5 products: one with a single point, one with blank latest values.
        let mut store = MemoryStore::with_series(&[
            ("Bread", "Ontario", &[1.0, 1.1]),
            ("Eggs", "Ontario", &[3.0, 3.2]),
            ("Flour", "Ontario", &[2.0, 2.1]),
            ("Milk", "Ontario", &[2.5]),
        ]);
        store.observations.push(Observation {
            product: "Tofu".to_string(),
            region: "Ontario".to_string(),
            period: "2023-01".to_string(),
            value: Some(4.0),
        });
        store.observations.push(Observation {
            product: "Tofu".to_string(),
            region: "Ontario".to_string(),
            period: "2023-02".to_string(),
            value: None,
        });
        let (store, recomputer) = recomputer(store);

        let summary = recomputer.recompute_region("Ontario").await.unwrap();
        assert_eq!(summary.processed_count, 3);
        assert_eq!(summary.skipped_count, 2);
        assert!(store.get_change("Milk", "Ontario").await.unwrap().is_none());
        assert!(store.get_change("Tofu", "Ontario").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skipped_product_keeps_its_previously_stored_records() {
        let mut store = MemoryStore::with_series(&[("Milk", "Ontario", &[2.5])]);
        let stale = EnrichedChange {
            change: crate::model::ChangeRecord {
                product: "Milk".to_string(),
                region: "Ontario".to_string(),
                current_value: 2.5,
                previous_value: 2.4,
                change: 0.1,
                change_percent: Some(4.0),
                current_period: "2022-12".to_string(),
                previous_period: "2022-11".to_string(),
                computed_at: Utc::now(),
            },
            year_ago: None,
        };
        store
            .changes
            .get_mut()
            .unwrap()
            .insert(("Milk".to_string(), "Ontario".to_string()), stale.clone());
        let (store, recomputer) = recomputer(store);

        let summary = recomputer.recompute_region("Ontario").await.unwrap();
        assert_eq!(summary.processed_count, 0);
        // Skip means hands off: the old record is neither replaced nor deleted.
        let kept = store.get_change("Milk", "Ontario").await.unwrap().unwrap();
        assert_eq!(kept.change.current_period, "2022-12");
    }

    #[tokio::test]
    async fn broken_streak_is_deleted_on_recompute() {
        // Flat newest step after a run of increases.
        let mut store =
            MemoryStore::with_series(&[("Milk", "Ontario", &[2.00, 2.10, 2.20, 2.20])]);
        store.streaks.get_mut().unwrap().insert(
            ("Milk".to_string(), "Ontario".to_string()),
            StreakRecord {
                product: "Milk".to_string(),
                region: "Ontario".to_string(),
                length: 3,
                direction: Direction::Increase,
                points: vec![StreakPoint {
                    period: "2023-01".to_string(),
                    value: Some(2.0),
                }],
                computed_at: Utc::now(),
            },
        );
        let (store, recomputer) = recomputer(store);

        recomputer.recompute_region("Ontario").await.unwrap();
        // Flat newest step: no active streak, so the stale record is gone
        // while the change record is still written.
        assert!(store.get_streak("Milk", "Ontario").await.unwrap().is_none());
        assert!(store.get_change("Milk", "Ontario").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn year_ago_lookup_enriches_the_stored_change() {
        let mut store = MemoryStore::with_series(&[]);
        for (period, value) in [("2023-01", 2.50), ("2023-12", 2.90), ("2024-01", 3.00)] {
            store.observations.push(Observation {
                product: "Milk".to_string(),
                region: "Ontario".to_string(),
                period: period.to_string(),
                value: Some(value),
            });
        }
        let (store, recomputer) = recomputer(store);

        recomputer.recompute_region("Ontario").await.unwrap();
        let change = store.get_change("Milk", "Ontario").await.unwrap().unwrap();
        let ya = change.year_ago.unwrap();
        assert!((ya.value - 2.50).abs() < 1e-9);
        assert!((ya.change - 0.50).abs() < 1e-9);
        assert!((ya.percent.unwrap() - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_year_ago_observation_stores_absent_fields() {
        let (store, recomputer) = recomputer(MemoryStore::with_series(&[(
            "Milk",
            "Ontario",
            &[2.90, 3.00],
        )]));

        recomputer.recompute_region("Ontario").await.unwrap();
        let change = store.get_change("Milk", "Ontario").await.unwrap().unwrap();
        assert!(change.year_ago.is_none());
    }

    #[tokio::test]
    async fn store_outage_propagates_for_the_region() {
        let mut store = MemoryStore::with_series(&[("Milk", "Ontario", &[2.0, 2.1])]);
        store.failing_region = Some("Ontario".to_string());
        let (_, recomputer) = recomputer(store);

        let err = recomputer.recompute_region("Ontario").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[tokio::test]
    async fn one_failing_region_does_not_block_the_others() {
        let mut store = MemoryStore::with_series(&[
            ("Milk", "Alberta", &[2.0, 2.1]),
            ("Milk", "Ontario", &[2.0, 2.1]),
            ("Milk", "Quebec", &[2.0, 2.1]),
        ]);
        store.failing_region = Some("Ontario".to_string());
        let (_, recomputer) = recomputer(store);

        let report = recomputer.recompute_all(&[]).await.unwrap();
        assert_eq!(report.total_processed, 2);
        assert_eq!(report.per_region.len(), 3);

        let ontario = report
            .per_region
            .iter()
            .find(|o| o.region == "Ontario")
            .unwrap();
        assert!(!ontario.success);
        assert!(ontario.error.as_deref().unwrap().contains("unavailable"));
        assert!(
            report
                .per_region
                .iter()
                .filter(|o| o.region != "Ontario")
                .all(|o| o.success && o.processed_count == 1)
        );
    }

    #[tokio::test]
    async fn region_allowlist_limits_the_run() {
        let (_, recomputer) = recomputer(MemoryStore::with_series(&[
            ("Milk", "Ontario", &[2.0, 2.1]),
            ("Milk", "Quebec", &[2.0, 2.1]),
        ]));

        let report = recomputer
            .recompute_all(&["Quebec".to_string()])
            .await
            .unwrap();
        assert_eq!(report.per_region.len(), 1);
        assert_eq!(report.per_region[0].region, "Quebec");
    }

    #[tokio::test]
    async fn recompute_is_idempotent_over_unchanged_input() {
        let (store, recomputer) = recomputer(MemoryStore::with_series(&[(
            "Milk",
            "Ontario",
            &[2.00, 2.10, 2.20],
        )]));

        recomputer.recompute_region("Ontario").await.unwrap();
        let first_change = store.get_change("Milk", "Ontario").await.unwrap().unwrap();
        let first_streak = store.get_streak("Milk", "Ontario").await.unwrap().unwrap();

        recomputer.recompute_region("Ontario").await.unwrap();
        let second_change = store.get_change("Milk", "Ontario").await.unwrap().unwrap();
        let second_streak = store.get_streak("Milk", "Ontario").await.unwrap().unwrap();

        // Identical derived values; only the write timestamp may differ.
        assert_eq!(
            (&first_change.change.current_value, &first_change.change.change,
             &first_change.change.change_percent, &first_change.year_ago),
            (&second_change.change.current_value, &second_change.change.change,
             &second_change.change.change_percent, &second_change.year_ago)
        );
        assert_eq!(first_streak.length, second_streak.length);
        assert_eq!(first_streak.direction, second_streak.direction);
        assert_eq!(first_streak.points, second_streak.points);
    }
}
