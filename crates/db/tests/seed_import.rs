use std::fs;

use chrono::Utc;
use parceldesk_core::domain::customer::CustomerId;
use parceldesk_core::domain::order::{OrderId, OrderStatus};
use parceldesk_db::{
    connect_with_settings, migrations, DemoDataset, FixtureError, JsonDocuments, RecordStore,
};
use tempfile::TempDir;

async fn sql_store() -> RecordStore {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    RecordStore::sql(pool)
}

#[tokio::test]
async fn demo_seed_is_idempotent() {
    let store = sql_store().await;
    let now = Utc::now();

    let first = DemoDataset::load(&store, now).await.expect("first seed");
    let second = DemoDataset::load(&store, now).await.expect("second seed");
    assert_eq!(first, second);

    let customers = store.customers.list().await.expect("customers");
    let orders = store.orders.list().await.expect("orders");
    assert_eq!(customers.len(), first.customers);
    assert_eq!(orders.len(), first.orders);

    let john = store
        .customers
        .find_by_email("John.Doe@Email.com")
        .await
        .expect("lookup")
        .expect("john is seeded");
    let recent = store.recent_orders(&john.id, 14, now).await.expect("recent");
    assert!(!recent.is_empty());
    assert!(recent.windows(2).all(|pair| pair[0].ordered_at >= pair[1].ordered_at));
}

#[tokio::test]
async fn json_documents_import_into_sql_store() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("users.json"),
        r#"{"users": [
            {"user_id": "usr_001", "email": "john.doe@email.com", "name": "John Doe"},
            {"user_id": "usr_002", "email": "jane.smith@email.com", "name": "Jane Smith"}
        ]}"#,
    )
    .expect("write users");
    fs::write(
        dir.path().join("orders.json"),
        r#"{"orders": [
            {
                "order_id": "ORD-2024-001234",
                "user_id": "usr_001",
                "product_name": "Wireless Bluetooth Headphones",
                "status": "shipped",
                "tracking_number": "TRK123456789",
                "estimated_delivery": "2024-01-20",
                "order_date": "2024-01-10T09:30:00Z",
                "total_amount": 89.99
            },
            {
                "order_id": "ORD-2024-002001",
                "user_id": "usr_002",
                "product_name": "Smart Watch",
                "status": "processing",
                "order_date": "2024-01-12T11:00:00Z",
                "total_amount": 249.99
            }
        ]}"#,
    )
    .expect("write orders");

    let documents = JsonDocuments::read_dir(dir.path()).expect("read documents");
    let store = sql_store().await;
    let result = documents.load(&store).await.expect("import");
    assert_eq!(result.customers, 2);
    assert_eq!(result.orders, 2);

    let order = store
        .orders
        .find_by_id(&OrderId("ORD-2024-001234".to_owned()))
        .await
        .expect("lookup")
        .expect("imported");
    assert_eq!(order.owner_id, CustomerId("usr_001".to_owned()));
    assert_eq!(order.status, OrderStatus::Shipped);
    assert_eq!(order.tracking_number.as_deref(), Some("TRK123456789"));

    let watch = store
        .orders
        .find_by_id(&OrderId("ORD-2024-002001".to_owned()))
        .await
        .expect("lookup")
        .expect("imported");
    assert!(watch.tracking_number.is_none());
    assert!(watch.estimated_delivery.is_none());
}

#[test]
fn orders_for_unknown_users_are_refused() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("users.json"), r#"{"users": []}"#).expect("write users");
    fs::write(
        dir.path().join("orders.json"),
        r#"{"orders": [{
            "order_id": "ORD-1", "user_id": "usr_404", "product_name": "Lamp",
            "status": "processing", "order_date": "2024-01-12T11:00:00Z", "total_amount": 10.0
        }]}"#,
    )
    .expect("write orders");

    let error = JsonDocuments::read_dir(dir.path()).expect_err("unknown owner");
    assert!(matches!(error, FixtureError::UnknownOwner { ref user, .. } if user == "usr_404"));
}

#[test]
fn missing_documents_name_the_path() {
    let dir = TempDir::new().expect("tempdir");
    let error = JsonDocuments::read_dir(dir.path()).expect_err("no files");

    assert!(matches!(error, FixtureError::Read { ref path, .. } if path.ends_with("users.json")));
}
