//! PostgreSQL backend.
//!
//! Records are stored as JSONB documents. The columns next to `doc` are
//! denormalized copies used for lookups (`sku`) and operator-flag scans.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::{
    MarketplaceCredentials, RecordFlag, ShopRecord, ShopStore, StockKey, StockRecord,
    StockRecordPatch, StockRecordStore, StoreError, StoreResult,
};

pub const ENV_DB_URL: &str = "STK_DATABASE_URL";

/// Connect to Postgres using the URL held in env var `env_name`
/// (normally [`ENV_DB_URL`]).
pub async fn connect_from_env(env_name: &str) -> Result<PgPool> {
    let url = std::env::var(env_name).with_context(|| format!("missing env var {env_name}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_stock_records_table: bool,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded SQLx migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("db migrate failed")?;
        Ok(())
    }

    /// Connectivity + schema presence.
    pub async fn status(&self) -> Result<DbStatus> {
        let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
            .fetch_one(&self.pool)
            .await
            .context("status connectivity query failed")?;

        let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
            r#"
            select exists (
                select 1
                from information_schema.tables
                where table_schema='public' and table_name='stock_records'
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("status table-exists query failed")?;

        Ok(DbStatus {
            ok: one == 1,
            has_stock_records_table: exists,
        })
    }
}

fn decode_record(doc: Value) -> StoreResult<StockRecord> {
    Ok(serde_json::from_value(doc)?)
}

fn decode_shop(doc: Value) -> StoreResult<ShopRecord> {
    Ok(serde_json::from_value(doc)?)
}

#[async_trait]
impl StockRecordStore for PgStore {
    async fn get(&self, shop: &str, key: &StockKey) -> StoreResult<Option<StockRecord>> {
        let row = sqlx::query(
            r#"
            select doc from stock_records
            where shop_domain = $1 and record_key = $2
            "#,
        )
        .bind(shop)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(decode_record(r.try_get("doc")?)?)),
            None => Ok(None),
        }
    }

    async fn find_by_sku(&self, shop: &str, sku: &str) -> StoreResult<Option<StockRecord>> {
        let row = sqlx::query(
            r#"
            select doc from stock_records
            where shop_domain = $1 and sku = $2
            order by record_key
            limit 1
            "#,
        )
        .bind(shop)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(decode_record(r.try_get("doc")?)?)),
            None => Ok(None),
        }
    }

    async fn get_all_where(&self, shop: &str, flag: RecordFlag) -> StoreResult<Vec<StockRecord>> {
        // Column name comes from a closed enum, never from input.
        let sql = format!(
            "select doc from stock_records where shop_domain = $1 and {} order by record_key",
            flag.column()
        );
        let rows = sqlx::query(&sql).bind(shop).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|r| decode_record(r.try_get("doc")?))
            .collect()
    }

    async fn upsert_merge(
        &self,
        shop: &str,
        key: &StockKey,
        patch: &StockRecordPatch,
    ) -> StoreResult<StockRecord> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            select doc from stock_records
            where shop_domain = $1 and record_key = $2
            for update
            "#,
        )
        .bind(shop)
        .bind(key.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let mut rec = match existing {
            Some(r) => decode_record(r.try_get("doc")?)?,
            None => StockRecord::new(key.clone()),
        };
        let now = Utc::now();
        rec.merge(patch, now);
        let doc = serde_json::to_value(&rec)?;

        sqlx::query(
            r#"
            insert into stock_records (
              shop_domain, record_key, sku, override_requested, link_sku_requested, doc, updated_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7
            )
            on conflict (shop_domain, record_key) do update set
              sku = excluded.sku,
              override_requested = excluded.override_requested,
              link_sku_requested = excluded.link_sku_requested,
              doc = excluded.doc,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(shop)
        .bind(key.as_str())
        .bind(&rec.sku)
        .bind(rec.override_requested)
        .bind(rec.link_sku_requested)
        .bind(&doc)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rec)
    }
}

#[async_trait]
impl ShopStore for PgStore {
    async fn get_shop(&self, shop: &str) -> StoreResult<ShopRecord> {
        let row = sqlx::query("select doc from shops where shop_domain = $1")
            .bind(shop)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => decode_shop(r.try_get("doc")?),
            None => Err(StoreError::NotFound(format!("shop {shop}"))),
        }
    }

    async fn put_shop(&self, record: &ShopRecord) -> StoreResult<()> {
        let doc = serde_json::to_value(record)?;
        sqlx::query(
            r#"
            insert into shops (shop_domain, doc, updated_at)
            values ($1, $2, now())
            on conflict (shop_domain) do update set
              doc = excluded.doc,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.shop_domain)
        .bind(&doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_marketplace_credentials(
        &self,
        shop: &str,
        creds: &MarketplaceCredentials,
    ) -> StoreResult<()> {
        let creds = serde_json::to_value(creds)?;
        let res = sqlx::query(
            r#"
            update shops
            set doc = jsonb_set(doc, '{marketplace}', $2::jsonb, true),
                updated_at = now()
            where shop_domain = $1
            "#,
        )
        .bind(shop)
        .bind(&creds)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("shop {shop}")));
        }
        Ok(())
    }

    async fn save_marketplace_shop(&self, shop: &str, shop_id: i64, name: &str) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            update shops
            set doc = doc || jsonb_build_object(
                  'marketplace_shop_id', $2::bigint,
                  'marketplace_shop_name', $3::text),
                updated_at = now()
            where shop_domain = $1
            "#,
        )
        .bind(shop)
        .bind(shop_id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("shop {shop}")));
        }
        Ok(())
    }
}
