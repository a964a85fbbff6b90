//! Request and response bodies

use serde::{Deserialize, Serialize};

use crate::record::{LineItem, RecordId};

/// Response of `POST clients`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTokenResponse {
    pub client_token: String,
}

/// Body of `POST orders`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub first_name: String,
    pub last_name: String,
    pub items: Vec<LineItem>,
    /// Sum of item prices in cents
    pub total: i64,
}

impl NewOrder {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Default::default()
        }
    }

    /// Add an item and keep `total` in step
    pub fn item(mut self, item: LineItem) -> Self {
        self.total += item.price;
        self.items.push(item);
        self
    }
}

/// Body of `PATCH orders`
#[derive(Debug, Clone, Serialize)]
pub struct OrderUpdate {
    #[serde(rename = "sk")]
    pub id: RecordId,
    pub status: String,
}

impl OrderUpdate {
    pub fn status(id: impl Into<RecordId>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
        }
    }
}
