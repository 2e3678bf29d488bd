//! Integration: SQL Driver
//!
//! Requires `--features sql`.

#![cfg(feature = "sql")]

use std::sync::Arc;

use forage::{ConfigOptions, DriverRegistry, DropOptions, Forage, SqlDriver};
use serde_json::{json, Value};

fn instance(registry: &Arc<DriverRegistry>, store: &str) -> Forage {
    Forage::builder()
        .with_registry(Arc::clone(registry))
        .with_options(
            ConfigOptions::new()
                .with_driver("webSQLStorage")
                .with_name("app")
                .with_store_name(store),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_stores_are_tables_in_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(DriverRegistry::new());
    registry.register_builtin(Arc::new(SqlDriver::new(dir.path())));

    let a = instance(&registry, "a");
    let b = instance(&registry, "b-2");
    a.set_item("k", &json!({"nested": [1, true]})).await.unwrap();
    b.set_item("k", &"other").await.unwrap();

    assert_eq!(a.get_item("k").await.unwrap(), json!({"nested": [1, true]}));
    assert_eq!(b.get_item("k").await.unwrap(), json!("other"));
    assert_eq!(b.config().store_name, "b_2");
    assert!(dir.path().join("app.sqlite").exists());

    a.drop_instance(DropOptions::default().with_name("app"))
        .await
        .unwrap();
    assert_eq!(
        instance(&registry, "b-2").get_item("k").await.unwrap(),
        Value::Null
    );
}

#[tokio::test]
async fn test_unset_directory_is_unsupported() {
    let registry = Arc::new(DriverRegistry::new());
    // Without FORAGE_SQL_DIR the driver has nowhere to keep its files.
    if std::env::var_os("FORAGE_SQL_DIR").is_some() {
        return;
    }
    registry.register_builtin(Arc::new(SqlDriver::from_env()));
    assert!(!registry.supports("webSQLStorage"));
}
