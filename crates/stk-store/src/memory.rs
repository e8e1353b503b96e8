//! In-process store. Used by tests and `stk sync --memory`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    MarketplaceCredentials, RecordFlag, ShopRecord, ShopStore, StockKey, StockRecord,
    StockRecordPatch, StockRecordStore, StoreError, StoreResult,
};

#[derive(Default)]
struct Inner {
    // shop -> key -> record
    records: BTreeMap<String, BTreeMap<StockKey, StockRecord>>,
    shops: BTreeMap<String, ShopRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shop(shop: ShopRecord) -> Self {
        let store = Self::default();
        if let Ok(mut g) = store.inner.lock() {
            g.shops.insert(shop.shop_domain.clone(), shop);
        }
        store
    }

    /// Snapshot of every record for `shop`, in key order.
    pub fn records(&self, shop: &str) -> Vec<StockRecord> {
        match self.inner.lock() {
            Ok(g) => g
                .records
                .get(shop)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl StockRecordStore for MemoryStore {
    async fn get(&self, shop: &str, key: &StockKey) -> StoreResult<Option<StockRecord>> {
        let g = self.lock()?;
        Ok(g.records.get(shop).and_then(|m| m.get(key)).cloned())
    }

    async fn find_by_sku(&self, shop: &str, sku: &str) -> StoreResult<Option<StockRecord>> {
        let g = self.lock()?;
        Ok(g.records.get(shop).and_then(|m| {
            m.values()
                .find(|r| r.sku.as_deref() == Some(sku))
                .cloned()
        }))
    }

    async fn get_all_where(&self, shop: &str, flag: RecordFlag) -> StoreResult<Vec<StockRecord>> {
        let g = self.lock()?;
        Ok(g.records
            .get(shop)
            .map(|m| m.values().filter(|r| flag.is_set(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_merge(
        &self,
        shop: &str,
        key: &StockKey,
        patch: &StockRecordPatch,
    ) -> StoreResult<StockRecord> {
        let mut g = self.lock()?;
        let rec = g
            .records
            .entry(shop.to_string())
            .or_default()
            .entry(key.clone())
            .or_insert_with(|| StockRecord::new(key.clone()));
        rec.merge(patch, Utc::now());
        Ok(rec.clone())
    }
}

#[async_trait]
impl ShopStore for MemoryStore {
    async fn get_shop(&self, shop: &str) -> StoreResult<ShopRecord> {
        let g = self.lock()?;
        g.shops
            .get(shop)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("shop {shop}")))
    }

    async fn put_shop(&self, record: &ShopRecord) -> StoreResult<()> {
        let mut g = self.lock()?;
        g.shops.insert(record.shop_domain.clone(), record.clone());
        Ok(())
    }

    async fn save_marketplace_credentials(
        &self,
        shop: &str,
        creds: &MarketplaceCredentials,
    ) -> StoreResult<()> {
        let mut g = self.lock()?;
        let rec = g
            .shops
            .get_mut(shop)
            .ok_or_else(|| StoreError::NotFound(format!("shop {shop}")))?;
        rec.marketplace = creds.clone();
        Ok(())
    }

    async fn save_marketplace_shop(&self, shop: &str, shop_id: i64, name: &str) -> StoreResult<()> {
        let mut g = self.lock()?;
        let rec = g
            .shops
            .get_mut(shop)
            .ok_or_else(|| StoreError::NotFound(format!("shop {shop}")))?;
        rec.marketplace_shop_id = Some(shop_id);
        rec.marketplace_shop_name = Some(name.to_string());
        Ok(())
    }
}
