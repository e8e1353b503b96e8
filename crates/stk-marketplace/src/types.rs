//! Marketplace wire types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// OAuth
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub enum TokenRequest {
    RefreshToken {
        refresh_token: String,
    },
    AuthorizationCode {
        code: String,
        code_verifier: String,
        redirect_uri: String,
    },
}

impl TokenRequest {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenRequest::RefreshToken { .. } => "refresh_token",
            TokenRequest::AuthorizationCode { .. } => "authorization_code",
        }
    }
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<REDACTED>")
            .field("refresh_token", &"<REDACTED>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
}

// ---------------------------------------------------------------------------
// Shops and listings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketplaceShop {
    pub shop_id: i64,
    #[serde(default)]
    pub shop_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: i64,
    #[serde(default)]
    pub shop_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    /// Combined quantity of every product in the listing.
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ListingsPage {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub results: Vec<Listing>,
}

// ---------------------------------------------------------------------------
// Listing inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub divisor: i64,
    #[serde(default)]
    pub currency_code: String,
}

impl Money {
    pub fn as_decimal(&self) -> f64 {
        let divisor = if self.divisor == 0 { 1 } else { self.divisor };
        self.amount as f64 / divisor as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    #[serde(default)]
    pub offering_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub property_id: i64,
    #[serde(default)]
    pub property_name: String,
    #[serde(default)]
    pub scale_id: Option<i64>,
    #[serde(default)]
    pub value_ids: Vec<i64>,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingProduct {
    pub product_id: i64,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub offerings: Vec<Offering>,
    #[serde(default)]
    pub property_values: Vec<PropertyValue>,
}

impl ListingProduct {
    /// Stock quantity: the first offering's quantity.
    pub fn quantity(&self) -> Option<i64> {
        self.offerings.first().map(|o| o.quantity)
    }

    /// Live products with at least one offering take part in sync.
    pub fn is_syncable(&self) -> bool {
        !self.is_deleted && !self.offerings.is_empty()
    }

    pub fn sku(&self) -> Option<&str> {
        let s = self.sku.trim();
        (!s.is_empty()).then_some(s)
    }

    /// `"Colour: Red, Size: S-M"` style description of the variation.
    pub fn variation(&self) -> Option<String> {
        let parts: Vec<String> = self
            .property_values
            .iter()
            .map(|pv| format!("{}: {}", pv.property_name, pv.values.join("-")))
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingInventory {
    #[serde(default)]
    pub products: Vec<ListingProduct>,
    #[serde(default)]
    pub price_on_property: Vec<Value>,
    #[serde(default)]
    pub quantity_on_property: Vec<i64>,
    #[serde(default)]
    pub sku_on_property: Vec<i64>,
}

impl ListingInventory {
    pub fn product(&self, product_id: i64) -> Option<&ListingProduct> {
        self.products.iter().find(|p| p.product_id == product_id)
    }

    /// Full replacement payload for this listing.
    ///
    /// Products named in `quantities` get that quantity (clamped at zero);
    /// every other product keeps its current one. `skus` rewrites the sku of
    /// the named products.
    pub fn to_update(
        &self,
        quantities: &BTreeMap<i64, i64>,
        skus: &BTreeMap<i64, String>,
    ) -> InventoryUpdate {
        let products = self
            .products
            .iter()
            .filter(|p| p.is_syncable())
            .map(|p| {
                let sku = skus
                    .get(&p.product_id)
                    .cloned()
                    .unwrap_or_else(|| p.sku.clone());
                let offerings = p
                    .offerings
                    .iter()
                    .filter(|o| !o.is_deleted)
                    .enumerate()
                    .map(|(i, o)| OfferingUpdate {
                        quantity: match (i, quantities.get(&p.product_id)) {
                            (0, Some(q)) => (*q).max(0),
                            _ => o.quantity,
                        },
                        is_enabled: o.is_enabled,
                        price: o.price.as_decimal(),
                    })
                    .collect();
                let property_values = p
                    .property_values
                    .iter()
                    .map(|pv| PropertyValueUpdate {
                        property_id: pv.property_id,
                        property_name: pv.property_name.clone(),
                        scale_id: pv.scale_id,
                        value_ids: pv.value_ids.clone(),
                        values: pv.values.clone(),
                    })
                    .collect();
                ProductUpdate {
                    sku,
                    offerings,
                    property_values,
                }
            })
            .collect();

        InventoryUpdate {
            products,
            price_on_property: self.price_on_property.clone(),
            quantity_on_property: self.quantity_on_property.clone(),
            sku_on_property: self.sku_on_property.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory update payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryUpdate {
    pub products: Vec<ProductUpdate>,
    pub price_on_property: Vec<Value>,
    pub quantity_on_property: Vec<i64>,
    pub sku_on_property: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductUpdate {
    pub sku: String,
    pub offerings: Vec<OfferingUpdate>,
    pub property_values: Vec<PropertyValueUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferingUpdate {
    pub quantity: i64,
    pub is_enabled: bool,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyValueUpdate {
    pub property_id: i64,
    pub property_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_id: Option<i64>,
    pub value_ids: Vec<i64>,
    pub values: Vec<String>,
}
