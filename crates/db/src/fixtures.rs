use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use parceldesk_core::domain::customer::{Customer, CustomerId};
use parceldesk_core::domain::order::{OrderId, OrderRecord, OrderStatus};

use crate::repositories::RepositoryError;
use crate::store::RecordStore;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("could not read fixture `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse fixture `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("order `{order}` references unknown user `{user}`")]
    UnknownOwner { order: String, user: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub customers: usize,
    pub orders: usize,
}

/// Demo records with order dates relative to the seeding time, so the default
/// 14-day lookback always finds something.
pub struct DemoDataset;

struct DemoOrder {
    id: &'static str,
    owner: &'static str,
    product: &'static str,
    status: OrderStatus,
    tracking: Option<&'static str>,
    delivery_in_days: Option<i64>,
    ordered_days_ago: i64,
    amount_cents: i64,
}

const DEMO_CUSTOMERS: &[(&str, &str, &str)] = &[
    ("usr_001", "john.doe@email.com", "John Doe"),
    ("usr_002", "jane.smith@email.com", "Jane Smith"),
    ("usr_003", "bob.wilson@email.com", "Bob Wilson"),
    ("usr_004", "alice.johnson@email.com", "Alice Johnson"),
    ("usr_005", "charlie.brown@email.com", "Charlie Brown"),
];

const DEMO_ORDERS: &[DemoOrder] = &[
    DemoOrder {
        id: "ORD-2024-001234",
        owner: "usr_001",
        product: "Wireless Bluetooth Headphones",
        status: OrderStatus::Shipped,
        tracking: Some("TRK123456789"),
        delivery_in_days: Some(2),
        ordered_days_ago: 3,
        amount_cents: 8_999,
    },
    DemoOrder {
        id: "ORD-2024-001235",
        owner: "usr_001",
        product: "USB-C Charging Cable",
        status: OrderStatus::Delivered,
        tracking: Some("TRK123456790"),
        delivery_in_days: Some(-5),
        ordered_days_ago: 10,
        amount_cents: 1_999,
    },
    DemoOrder {
        id: "ORD-2024-001236",
        owner: "usr_001",
        product: "Laptop Stand",
        status: OrderStatus::Processing,
        tracking: None,
        delivery_in_days: Some(7),
        ordered_days_ago: 1,
        amount_cents: 4_999,
    },
    DemoOrder {
        id: "ORD-2024-002001",
        owner: "usr_002",
        product: "Smart Watch",
        status: OrderStatus::OutForDelivery,
        tracking: Some("TRK223456789"),
        delivery_in_days: Some(0),
        ordered_days_ago: 4,
        amount_cents: 24_999,
    },
    DemoOrder {
        id: "ORD-2024-002002",
        owner: "usr_002",
        product: "Yoga Mat",
        status: OrderStatus::Delivered,
        tracking: Some("TRK223456790"),
        delivery_in_days: Some(-25),
        ordered_days_ago: 30,
        amount_cents: 3_500,
    },
    DemoOrder {
        id: "ORD-2024-003001",
        owner: "usr_003",
        product: "Coffee Maker",
        status: OrderStatus::Shipped,
        tracking: Some("TRK323456789"),
        delivery_in_days: Some(3),
        ordered_days_ago: 6,
        amount_cents: 12_999,
    },
    DemoOrder {
        id: "ORD-2024-003002",
        owner: "usr_003",
        product: "Desk Lamp",
        status: OrderStatus::Cancelled,
        tracking: None,
        delivery_in_days: None,
        ordered_days_ago: 8,
        amount_cents: 3_999,
    },
    DemoOrder {
        id: "ORD-2024-004001",
        owner: "usr_004",
        product: "Running Shoes",
        status: OrderStatus::Processing,
        tracking: None,
        delivery_in_days: Some(6),
        ordered_days_ago: 2,
        amount_cents: 11_999,
    },
    DemoOrder {
        id: "ORD-2024-005001",
        owner: "usr_005",
        product: "Mechanical Keyboard",
        status: OrderStatus::Delivered,
        tracking: Some("TRK523456789"),
        delivery_in_days: Some(-4),
        ordered_days_ago: 12,
        amount_cents: 15_999,
    },
    DemoOrder {
        id: "ORD-2024-005002",
        owner: "usr_005",
        product: "27-inch Monitor",
        status: OrderStatus::Shipped,
        tracking: Some("TRK523456790"),
        delivery_in_days: Some(1),
        ordered_days_ago: 5,
        amount_cents: 29_999,
    },
];

impl DemoDataset {
    pub fn customers() -> Vec<Customer> {
        DEMO_CUSTOMERS
            .iter()
            .map(|(id, email, name)| Customer {
                id: CustomerId((*id).to_string()),
                email: (*email).to_string(),
                name: (*name).to_string(),
            })
            .collect()
    }

    pub fn orders(now: DateTime<Utc>) -> Vec<OrderRecord> {
        let today = now.date_naive();
        DEMO_ORDERS
            .iter()
            .map(|order| OrderRecord {
                id: OrderId(order.id.to_string()),
                owner_id: CustomerId(order.owner.to_string()),
                product_name: order.product.to_string(),
                status: order.status,
                tracking_number: order.tracking.map(str::to_string),
                estimated_delivery: order.delivery_in_days.map(|days| today + Duration::days(days)),
                ordered_at: now - Duration::days(order.ordered_days_ago),
                total_amount: Decimal::new(order.amount_cents, 2),
            })
            .collect()
    }

    /// Upserts the demo records; running it twice leaves one copy of each.
    pub async fn load(store: &RecordStore, now: DateTime<Utc>) -> Result<SeedResult, FixtureError> {
        JsonDocuments { customers: Self::customers(), orders: Self::orders(now) }.load(store).await
    }
}

/// Records imported from a `users.json` / `orders.json` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonDocuments {
    pub customers: Vec<Customer>,
    pub orders: Vec<OrderRecord>,
}

#[derive(Deserialize)]
struct UsersDocument {
    users: Vec<Customer>,
}

#[derive(Deserialize)]
struct OrdersDocument {
    orders: Vec<OrderRecord>,
}

impl JsonDocuments {
    pub fn read_dir(dir: &Path) -> Result<Self, FixtureError> {
        let users_path = dir.join("users.json");
        let orders_path = dir.join("orders.json");
        let users: UsersDocument = read_document(&users_path)?;
        let orders: OrdersDocument = read_document(&orders_path)?;

        let documents = Self { customers: users.users, orders: orders.orders };
        documents.check_owners()?;
        Ok(documents)
    }

    pub async fn load(self, store: &RecordStore) -> Result<SeedResult, FixtureError> {
        self.check_owners()?;
        let result = SeedResult { customers: self.customers.len(), orders: self.orders.len() };

        for customer in self.customers {
            store.customers.save(customer).await?;
        }
        for order in self.orders {
            store.orders.save(order).await?;
        }
        Ok(result)
    }

    fn check_owners(&self) -> Result<(), FixtureError> {
        for order in &self.orders {
            let known = self.customers.iter().any(|customer| customer.id == order.owner_id);
            if !known {
                return Err(FixtureError::UnknownOwner {
                    order: order.id.0.clone(),
                    user: order.owner_id.0.clone(),
                });
            }
        }
        Ok(())
    }
}

fn read_document<T>(path: &Path) -> Result<T, FixtureError>
where
    T: for<'de> Deserialize<'de>,
{
    let raw = fs::read_to_string(path)
        .map_err(|source| FixtureError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&raw)
        .map_err(|source| FixtureError::Parse { path: path.to_path_buf(), source })
}
