//! Relational backend: Postgres via sqlx.
//!
//! The table keeps one typed column per flat field, a unique index on
//! `hash_id` and a server-assigned `ingested_at` timestamp. A legacy `id`
//! column mirrors `hash_id` because the original deployment's table was
//! keyed by that name and downstream consumers still join on it.
//!
//! Upsert strategy: a point-lookup pre-check, then a plain insert. The
//! pre-check races against concurrent writers of the same identifier; the
//! in-process dedup stage makes that window practically unreachable, and a
//! lost race still cannot corrupt the table - the unique index rejects the
//! second insert and the violation is caught, logged and skipped.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use super::{StorageBackend, StoreError, UpsertOutcome};
use crate::record::{Record, flatten_value};

/// Connections kept in the pool. The crawl is fetch-bound, not
/// write-bound; a small pool is plenty.
const MAX_CONNECTIONS: u32 = 5;

/// Schema setup, executed at connect. Idempotent.
const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS estates (
    hash_id                     BIGINT NOT NULL,
    id                          BIGINT,
    name                        TEXT,
    labels_all                  TEXT,
    exclusively_at_rk           BOOLEAN,
    category                    TEXT,
    has_floor_plan              BOOLEAN,
    locality                    TEXT,
    new                         BOOLEAN,
    type                        TEXT,
    price                       BIGINT,
    seo_category_main_cb        TEXT,
    seo_category_sub_cb         TEXT,
    seo_category_type_cb        TEXT,
    seo_locality                TEXT,
    price_czk_value_raw         BIGINT,
    price_czk_unit              TEXT,
    price_czk_alt_value_raw     BIGINT,
    price_czk_alt_unit          TEXT,
    links_self_href             TEXT,
    links_iterator_href         TEXT,
    links_images                TEXT[],
    gps_lat                     DOUBLE PRECISION,
    gps_lon                     DOUBLE PRECISION,
    embedded_company_url        TEXT,
    embedded_company_id         BIGINT,
    embedded_company_name       TEXT,
    embedded_company_logo_small TEXT,
    source_category             TEXT,
    source_page                 INTEGER,
    scraped_at                  TIMESTAMPTZ,
    ingested_at                 TIMESTAMPTZ NOT NULL DEFAULT now()
)";

/// The uniqueness guarantee the upsert contract rests on.
const CREATE_UNIQUE_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS estates_hash_id_idx ON estates (hash_id)";

const INSERT: &str = r"
INSERT INTO estates (
    hash_id, id, name, labels_all, exclusively_at_rk, category,
    has_floor_plan, locality, new, type, price,
    seo_category_main_cb, seo_category_sub_cb, seo_category_type_cb,
    seo_locality, price_czk_value_raw, price_czk_unit,
    price_czk_alt_value_raw, price_czk_alt_unit, links_self_href,
    links_iterator_href, links_images, gps_lat, gps_lon,
    embedded_company_url, embedded_company_id, embedded_company_name,
    embedded_company_logo_small, source_category, source_page, scraped_at
) VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28,
    $29, $30, $31
)";

/// Postgres storage backend.
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects and sets up the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the connection or the schema
    /// setup fails - fatal at startup.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_UNIQUE_INDEX).execute(&pool).await?;

        info!("postgres schema ready");
        Ok(Self { pool })
    }

    /// Returns the underlying pool (integration tests use this).
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn exists(&self, hash_id: i64) -> Result<bool, StoreError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM estates WHERE hash_id = $1")
            .bind(hash_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, hash_id: i64, record: &Record) -> Result<(), sqlx::Error> {
        let scraped_at: Option<DateTime<Utc>> = record
            .get_str("scraped_at")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        sqlx::query(INSERT)
            .bind(hash_id)
            .bind(hash_id) // legacy id column mirrors hash_id
            .bind(text(record, "name"))
            .bind(text(record, "labels_all"))
            .bind(record.get_bool("exclusively_at_rk"))
            .bind(text(record, "category"))
            .bind(record.get_bool("has_floor_plan"))
            .bind(text(record, "locality"))
            .bind(record.get_bool("new"))
            .bind(text(record, "type"))
            .bind(record.get_i64("price"))
            .bind(text(record, "seo_category_main_cb"))
            .bind(text(record, "seo_category_sub_cb"))
            .bind(text(record, "seo_category_type_cb"))
            .bind(text(record, "seo_locality"))
            .bind(record.get_i64("price_czk_value_raw"))
            .bind(text(record, "price_czk_unit"))
            .bind(record.get_i64("price_czk_alt_value_raw"))
            .bind(text(record, "price_czk_alt_unit"))
            .bind(text(record, "links_self_href"))
            .bind(text(record, "links_iterator_href"))
            .bind(record.get_str_list("links_images"))
            .bind(record.get_f64("gps_lat"))
            .bind(record.get_f64("gps_lon"))
            .bind(text(record, "embedded_company_url"))
            .bind(record.get_i64("embedded_company_id"))
            .bind(text(record, "embedded_company_name"))
            .bind(text(record, "embedded_company_logo_small"))
            .bind(text(record, "source_category"))
            .bind(record.get_i64("source_page").and_then(|p| i32::try_from(p).ok()))
            .bind(scraped_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageBackend for PostgresStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        let hash_id = record.hash_id().ok_or(StoreError::MissingId)?;

        if self.exists(hash_id).await? {
            debug!(hash_id, "already stored - skipping");
            return Ok(UpsertOutcome::SkippedDuplicate);
        }

        match self.insert(hash_id, record).await {
            Ok(()) => Ok(UpsertOutcome::Inserted),
            // The pre-check lost a race; the unique index did its job.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                warn!(hash_id, "concurrent insert won the race - skipping");
                Ok(UpsertOutcome::SkippedDuplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Renders a field as flat text for a TEXT column.
fn text(record: &Record, name: &str) -> Option<String> {
    record.get(name).map(flatten_value)
}
