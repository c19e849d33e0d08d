use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Item;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToBagRequest {
    pub item_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BagList {
    pub items: Vec<BagEntryDto>,
    /// Sum of `price * quantity` at current prices, for display only.
    pub subtotal: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BagEntryDto {
    pub id: Uuid,
    pub item: Item,
    pub quantity: i32,
}
