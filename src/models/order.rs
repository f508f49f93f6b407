// models/order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub name: String,
    #[validate(length(min = 9, message = "Customer phone is required"))]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[validate(length(min = 1, message = "Item name is required"))]
    pub name: String,
    pub price: f64,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    #[validate(nested)]
    pub customer_info: CustomerInfo,
    #[validate(length(min = 1, message = "Cart must contain at least one item"), nested)]
    pub cart_items: Vec<CartItem>,
    #[validate(range(exclusive_min = 0.0, message = "Total must be greater than 0"))]
    pub total: f64,
    #[validate(length(min = 1, message = "Delivery address is required"))]
    pub delivery_address: String,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub customer_info: CustomerInfo,
    pub cart_items: Vec<CartItem>,
    pub total: f64,
    pub delivery_address: String,
    pub payment_method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(payload: CreateOrder) -> Self {
        Order {
            order_id: uuid::Uuid::new_v4().to_string(),
            customer_info: payload.customer_info,
            cart_items: payload.cart_items,
            total: payload.total,
            delivery_address: payload.delivery_address,
            payment_method: payload.payment_method,
            status: "pending".to_string(),
            created_at: Utc::now(),
        }
    }
}
