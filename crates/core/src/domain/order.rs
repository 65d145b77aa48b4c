use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "out_for_delivery" => Some(Self::OutForDelivery),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(rename = "order_id")]
    pub id: OrderId,
    #[serde(rename = "user_id")]
    pub owner_id: CustomerId,
    pub product_name: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<NaiveDate>,
    #[serde(rename = "order_date")]
    pub ordered_at: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
}

impl OrderRecord {
    pub fn is_owned_by(&self, customer: &CustomerId) -> bool {
        &self.owner_id == customer
    }

    pub fn summary_line(&self) -> String {
        format!(
            "- Order {}: {}\n  Status: {}\n  Tracking: {}\n  Est. Delivery: {}",
            self.id.0,
            self.product_name,
            self.status.as_str(),
            self.tracking_number.as_deref().unwrap_or("N/A"),
            self.estimated_delivery
                .map(|date| date.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        )
    }
}
