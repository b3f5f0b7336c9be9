use crate::model::{
    ChangeRecord, Direction, EnrichedChange, Observation, StorageError, StreakRecord, YearAgo,
};
use crate::storage::traits::{ResultStore, SeriesStore};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tokio::sync::Mutex;

/// SQLite-backed implementation of both store ports.
///
/// One connection guarded by an async mutex; every call locks, does its
/// synchronous work and releases. Each upsert is a single `INSERT OR
/// REPLACE`, so a cancelled batch run leaves nothing half-written.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens the database (`":memory:"` works for tests) and runs migrations.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS observations (
                product TEXT NOT NULL,
                region TEXT NOT NULL,
                period TEXT NOT NULL,
                value REAL,
                PRIMARY KEY (product, region, period)
            );

            CREATE TABLE IF NOT EXISTS price_changes (
                product TEXT NOT NULL,
                region TEXT NOT NULL,
                current_value REAL NOT NULL,
                previous_value REAL NOT NULL,
                change REAL NOT NULL,
                change_percent REAL,
                current_period TEXT NOT NULL,
                previous_period TEXT NOT NULL,
                computed_at TEXT NOT NULL,
                PRIMARY KEY (product, region)
            );

            CREATE TABLE IF NOT EXISTS price_streaks (
                product TEXT NOT NULL,
                region TEXT NOT NULL,
                length INTEGER NOT NULL,
                direction TEXT NOT NULL,
                points TEXT NOT NULL,
                computed_at TEXT NOT NULL,
                PRIMARY KEY (product, region)
            );
            ",
        )?;

        // The year-over-year columns arrived after the original schema;
        // make sure older databases pick them up.
        Self::migrate_add_column_if_missing(&conn, "price_changes", "year_ago_value", "REAL")?;
        Self::migrate_add_column_if_missing(&conn, "price_changes", "year_ago_change", "REAL")?;
        Self::migrate_add_column_if_missing(&conn, "price_changes", "year_ago_percent", "REAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
        }

        Ok(())
    }

    /// Inserts or replaces one observation. Not part of the recompute flow;
    /// importers and tests use this to populate the series table.
    pub async fn insert_observation(&self, obs: &Observation) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO observations (product, region, period, value)
             VALUES (?1, ?2, ?3, ?4)",
            params![&obs.product, &obs.region, &obs.period, &obs.value],
        )?;
        Ok(())
    }

    fn map_change(row: &Row) -> Result<EnrichedChange, rusqlite::Error> {
        let computed_at_str: String = row.get(11)?;
        let computed_at: DateTime<Utc> = computed_at_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let year_ago_value: Option<f64> = row.get(8)?;
        let year_ago_change: Option<f64> = row.get(9)?;
        let year_ago_percent: Option<f64> = row.get(10)?;
        let year_ago = match (year_ago_value, year_ago_change) {
            (Some(value), Some(change)) => Some(YearAgo {
                value,
                change,
                percent: year_ago_percent,
            }),
            _ => None,
        };

        Ok(EnrichedChange {
            change: ChangeRecord {
                product: row.get(0)?,
                region: row.get(1)?,
                current_value: row.get(2)?,
                previous_value: row.get(3)?,
                change: row.get(4)?,
                change_percent: row.get(5)?,
                current_period: row.get(6)?,
                previous_period: row.get(7)?,
                computed_at,
            },
            year_ago,
        })
    }

    fn map_streak(row: &Row) -> Result<StreakRecord, rusqlite::Error> {
        let direction_str: String = row.get(3)?;
        let direction = Direction::parse(&direction_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown streak direction: {}", direction_str).into(),
            )
        })?;

        let points_json: String = row.get(4)?;
        let points = serde_json::from_str(&points_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let computed_at_str: String = row.get(5)?;
        let computed_at: DateTime<Utc> = computed_at_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(StreakRecord {
            product: row.get(0)?,
            region: row.get(1)?,
            length: row.get(2)?,
            direction,
            points,
            computed_at,
        })
    }
}

const CHANGE_COLUMNS: &str = "product, region, current_value, previous_value, change, \
     change_percent, current_period, previous_period, \
     year_ago_value, year_ago_change, year_ago_percent, computed_at";

const STREAK_COLUMNS: &str = "product, region, length, direction, points, computed_at";

#[async_trait::async_trait]
impl SeriesStore for SqliteStorage {
    async fn list_regions(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT DISTINCT region FROM observations ORDER BY region")?;
        let regions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(regions)
    }

    async fn list_products(&self, region: &str) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT product FROM observations WHERE region = ?1 ORDER BY product",
        )?;
        let products = stmt
            .query_map(params![region], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(products)
    }

    async fn get_series(
        &self,
        product: &str,
        region: &str,
    ) -> Result<Vec<Observation>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT product, region, period, value FROM observations
             WHERE product = ?1 AND region = ?2 ORDER BY period ASC",
        )?;
        let series = stmt
            .query_map(params![product, region], |row| {
                Ok(Observation {
                    product: row.get(0)?,
                    region: row.get(1)?,
                    period: row.get(2)?,
                    value: row.get(3)?,
                })
            })?
            .collect::<Result<_, _>>()?;
        Ok(series)
    }

    async fn get_observation(
        &self,
        product: &str,
        region: &str,
        period: &str,
    ) -> Result<Option<Observation>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT product, region, period, value FROM observations
             WHERE product = ?1 AND region = ?2 AND period = ?3",
        )?;
        let mut rows = stmt.query(params![product, region, period])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Observation {
                product: row.get(0)?,
                region: row.get(1)?,
                period: row.get(2)?,
                value: row.get(3)?,
            }))
        } else {
            Ok(None)
        }
    }
}

#[async_trait::async_trait]
impl ResultStore for SqliteStorage {
    async fn upsert_change(&self, rec: &EnrichedChange) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        let change = &rec.change;
        let (ya_value, ya_change, ya_percent) = match &rec.year_ago {
            Some(ya) => (Some(ya.value), Some(ya.change), ya.percent),
            None => (None, None, None),
        };
        conn.execute(
            "INSERT OR REPLACE INTO price_changes (
                product, region, current_value, previous_value, change,
                change_percent, current_period, previous_period,
                year_ago_value, year_ago_change, year_ago_percent, computed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &change.product,
                &change.region,
                &change.current_value,
                &change.previous_value,
                &change.change,
                &change.change_percent,
                &change.current_period,
                &change.previous_period,
                &ya_value,
                &ya_change,
                &ya_percent,
                &change.computed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn upsert_streak(&self, rec: &StreakRecord) -> Result<(), StorageError> {
        let points_json = serde_json::to_string(&rec.points)
            .map_err(|e| StorageError::Corrupt(format!("streak points encode: {}", e)))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO price_streaks (
                product, region, length, direction, points, computed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &rec.product,
                &rec.region,
                &rec.length,
                rec.direction.as_str(),
                &points_json,
                &rec.computed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn delete_streak(&self, product: &str, region: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM price_streaks WHERE product = ?1 AND region = ?2",
            params![product, region],
        )?;
        Ok(())
    }

    async fn get_change(
        &self,
        product: &str,
        region: &str,
    ) -> Result<Option<EnrichedChange>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM price_changes WHERE product = ?1 AND region = ?2",
            CHANGE_COLUMNS
        ))?;
        let mut rows = stmt.query(params![product, region])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::map_change(row)?))
        } else {
            Ok(None)
        }
    }

    async fn get_streak(
        &self,
        product: &str,
        region: &str,
    ) -> Result<Option<StreakRecord>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM price_streaks WHERE product = ?1 AND region = ?2",
            STREAK_COLUMNS
        ))?;
        let mut rows = stmt.query(params![product, region])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::map_streak(row)?))
        } else {
            Ok(None)
        }
    }

    async fn top_changes(
        &self,
        region: &str,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<EnrichedChange>, StorageError> {
        // Rows whose percent is undefined (previous value was zero) sort
        // after every ranked row.
        let sql = match direction {
            Direction::Increase => format!(
                "SELECT {} FROM price_changes
                 WHERE region = ?1 AND change > 0
                 ORDER BY (change_percent IS NULL), change_percent DESC
                 LIMIT ?2",
                CHANGE_COLUMNS
            ),
            Direction::Decrease => format!(
                "SELECT {} FROM price_changes
                 WHERE region = ?1 AND change < 0
                 ORDER BY (change_percent IS NULL), change_percent ASC
                 LIMIT ?2",
                CHANGE_COLUMNS
            ),
        };

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let changes = stmt
            .query_map(params![region, limit as i64], |row| Self::map_change(row))?
            .collect::<Result<_, _>>()?;
        Ok(changes)
    }

    async fn current_streaks(&self, region: &str) -> Result<Vec<StreakRecord>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM price_streaks WHERE region = ?1 ORDER BY length DESC, product ASC",
            STREAK_COLUMNS
        ))?;
        let streaks = stmt
            .query_map(params![region], |row| Self::map_streak(row))?
            .collect::<Result<_, _>>()?;
        Ok(streaks)
    }

    async fn region_changes(&self, region: &str) -> Result<Vec<EnrichedChange>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM price_changes WHERE region = ?1 ORDER BY product ASC",
            CHANGE_COLUMNS
        ))?;
        let changes = stmt
            .query_map(params![region], |row| Self::map_change(row))?
            .collect::<Result<_, _>>()?;
        Ok(changes)
    }
}
