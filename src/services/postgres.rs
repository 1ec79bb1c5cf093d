use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;

use crate::core::geo_index::{GeoIndex, GeoIndexError};
use crate::models::{
    Asset, AssetKey, AssetRole, ComparableMatch, ComparableQuery, ComparisonSummary, GeoPoint,
    ValuationStatus,
};

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for GeoIndexError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => GeoIndexError::Timeout,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => GeoIndexError::Connection(e.to_string()),
            other => GeoIndexError::Database(other.to_string()),
        }
    }
}

/// Asset role as stored in the `asset_role` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "asset_role", rename_all = "lowercase")]
pub enum StoredRole {
    Potential,
    Comparable,
}

impl From<AssetRole> for StoredRole {
    fn from(value: AssetRole) -> Self {
        match value {
            AssetRole::Potential => StoredRole::Potential,
            AssetRole::Comparable => StoredRole::Comparable,
        }
    }
}

impl From<StoredRole> for AssetRole {
    fn from(value: StoredRole) -> Self {
        match value {
            StoredRole::Potential => AssetRole::Potential,
            StoredRole::Comparable => AssetRole::Comparable,
        }
    }
}

const ASSET_COLUMNS: &str = r#"
    a.role,
    ST_Y(a.location::geometry) AS lat,
    ST_X(a.location::geometry) AS lon,
    a.sqm, a.price, a.level, a.parking, a.construction_year,
    a.source, a.portfolio, a.source_unique_code,
    a.title, a.description, a.address, a.municipality, a.prefecture,
    a.subcategory, a.url
"#;

/// PostGIS-backed asset store.
///
/// Potential and comparable assets share the `assets` table, tagged by role
/// and deduplicated on `(role, source, portfolio, source_unique_code)`.
/// Summaries live in `potential_comparison_summary`, one row per potential
/// asset, overwritten on every run.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Insert an asset, or refresh it if its dedup key already exists.
    /// Returns the row id.
    pub async fn upsert_asset(&self, asset: &Asset) -> Result<i64, PostgresError> {
        asset
            .validate()
            .map_err(|e| PostgresError::InvalidInput(e.to_string()))?;

        let query = r#"
            INSERT INTO assets (
                role, location, sqm, price, level, parking, construction_year,
                source, portfolio, source_unique_code,
                title, description, address, municipality, prefecture, subcategory, url
            )
            VALUES (
                $1, ST_SetSRID(ST_MakePoint($2, $3), 4326)::geography,
                $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
            )
            ON CONFLICT (role, source, portfolio, source_unique_code)
            DO UPDATE SET
                location = EXCLUDED.location,
                sqm = EXCLUDED.sqm,
                price = EXCLUDED.price,
                level = EXCLUDED.level,
                parking = EXCLUDED.parking,
                construction_year = EXCLUDED.construction_year,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                address = EXCLUDED.address,
                municipality = EXCLUDED.municipality,
                prefecture = EXCLUDED.prefecture,
                subcategory = EXCLUDED.subcategory,
                url = EXCLUDED.url,
                updated_at = NOW()
            RETURNING id
        "#;

        let row = sqlx::query(query)
            .bind(StoredRole::from(asset.role))
            .bind(asset.location.lon)
            .bind(asset.location.lat)
            .bind(asset.sqm)
            .bind(asset.price)
            .bind(asset.level)
            .bind(asset.parking)
            .bind(asset.construction_year)
            .bind(&asset.source)
            .bind(&asset.portfolio)
            .bind(&asset.source_unique_code)
            .bind(&asset.title)
            .bind(&asset.description)
            .bind(&asset.address)
            .bind(&asset.municipality)
            .bind(&asset.prefecture)
            .bind(&asset.subcategory)
            .bind(&asset.url)
            .fetch_one(&self.pool)
            .await?;

        let id: i64 = row.try_get("id")?;
        tracing::debug!("Upserted {} asset {} as id {}", asset.role.as_str(), asset.key(), id);

        Ok(id)
    }

    /// Replace the stored summary of a potential asset.
    ///
    /// The potential asset must already be stored.
    pub async fn upsert_summary(&self, summary: &ComparisonSummary) -> Result<(), PostgresError> {
        let query = r#"
            INSERT INTO potential_comparison_summary (
                potential_asset_id, assets_count, average, min, max, median, std,
                normalized_mean, outliers_excluded, revaluated_price_meter,
                revaluation_total_price, max_buy_price, score, searched_radius,
                expansion_steps, reference_url, asset_url, status, updated_at
            )
            SELECT id, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, NOW()
            FROM assets
            WHERE role = 'potential' AND source = $1 AND portfolio = $2 AND source_unique_code = $3
            ON CONFLICT (potential_asset_id)
            DO UPDATE SET
                assets_count = EXCLUDED.assets_count,
                average = EXCLUDED.average,
                min = EXCLUDED.min,
                max = EXCLUDED.max,
                median = EXCLUDED.median,
                std = EXCLUDED.std,
                normalized_mean = EXCLUDED.normalized_mean,
                outliers_excluded = EXCLUDED.outliers_excluded,
                revaluated_price_meter = EXCLUDED.revaluated_price_meter,
                revaluation_total_price = EXCLUDED.revaluation_total_price,
                max_buy_price = EXCLUDED.max_buy_price,
                score = EXCLUDED.score,
                searched_radius = EXCLUDED.searched_radius,
                expansion_steps = EXCLUDED.expansion_steps,
                reference_url = EXCLUDED.reference_url,
                asset_url = EXCLUDED.asset_url,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
        "#;

        let key = &summary.asset_key;
        let result = sqlx::query(query)
            .bind(&key.source)
            .bind(&key.portfolio)
            .bind(&key.source_unique_code)
            .bind(summary.assets_count as i32)
            .bind(summary.average)
            .bind(summary.min)
            .bind(summary.max)
            .bind(summary.median)
            .bind(summary.std)
            .bind(summary.normalized_mean)
            .bind(summary.outliers_excluded as i32)
            .bind(summary.revaluated_price_meter)
            .bind(summary.revaluation_total_price)
            .bind(summary.max_buy_price)
            .bind(summary.score)
            .bind(summary.searched_radius)
            .bind(summary.expansion_steps as i32)
            .bind(&summary.reference_url)
            .bind(&summary.asset_url)
            .bind(summary.status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PostgresError::NotFound(format!("potential asset {}", key)));
        }

        tracing::debug!("Stored summary for {} ({})", key, summary.status.as_str());
        Ok(())
    }

    /// Store the potential asset, then its summary
    pub async fn persist_valuation(
        &self,
        asset: &Asset,
        summary: &ComparisonSummary,
    ) -> Result<(), PostgresError> {
        let mut potential = asset.clone();
        potential.role = AssetRole::Potential;
        self.upsert_asset(&potential).await?;
        self.upsert_summary(summary).await
    }

    /// Read the stored summary of a potential asset
    pub async fn get_summary(&self, key: &AssetKey) -> Result<Option<ComparisonSummary>, PostgresError> {
        let query = r#"
            SELECT
                s.assets_count, s.average, s.min, s.max, s.median, s.std,
                s.normalized_mean, s.outliers_excluded, s.revaluated_price_meter,
                s.revaluation_total_price, s.max_buy_price, s.score,
                s.searched_radius, s.expansion_steps, s.reference_url, s.asset_url, s.status
            FROM potential_comparison_summary s
            JOIN assets a ON a.id = s.potential_asset_id
            WHERE a.role = 'potential' AND a.source = $1 AND a.portfolio = $2 AND a.source_unique_code = $3
        "#;

        let row = sqlx::query(query)
            .bind(&key.source)
            .bind(&key.portfolio)
            .bind(&key.source_unique_code)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        let status = ValuationStatus::parse(&status)
            .ok_or_else(|| PostgresError::InvalidInput(format!("unknown valuation status: {}", status)))?;
        let assets_count: i32 = row.try_get("assets_count")?;
        let outliers_excluded: i32 = row.try_get("outliers_excluded")?;
        let expansion_steps: i32 = row.try_get("expansion_steps")?;

        Ok(Some(ComparisonSummary {
            asset_key: key.clone(),
            assets_count: assets_count.max(0) as usize,
            average: row.try_get("average")?,
            min: row.try_get("min")?,
            max: row.try_get("max")?,
            median: row.try_get("median")?,
            std: row.try_get("std")?,
            normalized_mean: row.try_get("normalized_mean")?,
            outliers_excluded: outliers_excluded.max(0) as usize,
            revaluated_price_meter: row.try_get("revaluated_price_meter")?,
            revaluation_total_price: row.try_get("revaluation_total_price")?,
            max_buy_price: row.try_get("max_buy_price")?,
            score: row.try_get("score")?,
            searched_radius: row.try_get("searched_radius")?,
            expansion_steps: expansion_steps.max(0) as u32,
            reference_url: row.try_get("reference_url")?,
            asset_url: row.try_get("asset_url")?,
            status,
        }))
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, PostgresError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn asset_from_row(row: &PgRow) -> Result<Asset, sqlx::Error> {
    let role: StoredRole = row.try_get("role")?;
    Ok(Asset {
        role: role.into(),
        location: GeoPoint::new(row.try_get("lat")?, row.try_get("lon")?),
        sqm: row.try_get("sqm")?,
        price: row.try_get("price")?,
        level: row.try_get("level")?,
        parking: row.try_get("parking")?,
        construction_year: row.try_get("construction_year")?,
        source: row.try_get("source")?,
        portfolio: row.try_get("portfolio")?,
        source_unique_code: row.try_get("source_unique_code")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        address: row.try_get("address")?,
        municipality: row.try_get("municipality")?,
        prefecture: row.try_get("prefecture")?,
        subcategory: row.try_get("subcategory")?,
        url: row.try_get("url")?,
    })
}

#[async_trait]
impl GeoIndex for PostgresClient {
    /// Sphere-based `ST_DWithin`/`ST_Distance` on `geography`, nearest first
    async fn query(&self, query: &ComparableQuery) -> Result<Vec<ComparableMatch>, GeoIndexError> {
        if !query.center.is_valid() {
            return Err(GeoIndexError::InvalidQuery(format!(
                "center out of range: {}, {}",
                query.center.lat, query.center.lon
            )));
        }

        let sql = format!(
            r#"
            SELECT {columns},
                ST_Distance(a.location, ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography, false) AS distance
            FROM assets a
            WHERE a.role = $3
              AND ST_DWithin(a.location, ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography, $4, false)
              AND a.sqm BETWEEN $5 AND $6
              AND (cardinality($7::text[]) = 0 OR a.source = ANY($7))
              AND (cardinality($8::text[]) = 0 OR a.portfolio = ANY($8))
              AND ($9::boolean IS NULL OR a.parking = $9)
              AND ($10::integer IS NULL OR a.construction_year >= $10)
              AND ($11::text IS NULL
                   OR NOT (a.source = $11 AND a.portfolio = $12 AND a.source_unique_code = $13))
            ORDER BY distance ASC, a.id ASC
            LIMIT $14
            "#,
            columns = ASSET_COLUMNS
        );

        let filters = &query.filters;
        let exclude = filters.exclude.as_ref();

        let rows = sqlx::query(&sql)
            .bind(query.center.lon)
            .bind(query.center.lat)
            .bind(StoredRole::from(filters.role))
            .bind(query.radius_m)
            .bind(query.sqm_range.min)
            .bind(query.sqm_range.max)
            .bind(&filters.sources)
            .bind(&filters.portfolios)
            .bind(filters.parking)
            .bind(filters.min_construction_year)
            .bind(exclude.map(|k| k.source.as_str()))
            .bind(exclude.map(|k| k.portfolio.as_str()))
            .bind(exclude.map(|k| k.source_unique_code.as_str()))
            .bind(query.limit.min(i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await?;

        let matches = rows
            .iter()
            .map(|row| -> Result<ComparableMatch, sqlx::Error> {
                Ok(ComparableMatch {
                    asset: asset_from_row(row)?,
                    distance_m: row.try_get("distance")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "PostGIS query within {}m returned {} comparables",
            query.radius_m,
            matches.len()
        );

        Ok(matches)
    }
}
