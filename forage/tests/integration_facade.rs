//! Integration: Façade
//!
//! Driver selection, readiness gating and storage passthrough, end to end
//! through `Forage` on an injected registry.

use std::collections::HashMap;
use std::sync::Arc;

use forage::{
    ConfigOptions, Driver, DriverRegistry, DropOptions, Forage, ForageError, LocalStorageArea,
    LocalStorageDriver, MemoryDriver, Method, ReadinessState, SimDriver, StoreError, SupportCheck,
};
use forage_core::dst::SimClock;
use serde_json::{json, Value};

async fn registry_with(drivers: &[&Arc<SimDriver>]) -> Arc<DriverRegistry> {
    let registry = Arc::new(DriverRegistry::new());
    for driver in drivers {
        registry
            .define_driver(Arc::clone(driver) as Arc<dyn Driver>)
            .await
            .unwrap();
    }
    registry
}

fn forage_on(registry: Arc<DriverRegistry>, drivers: &[&str]) -> Forage {
    Forage::builder()
        .with_registry(registry)
        .with_options(ConfigOptions::new().with_driver(drivers.to_vec()))
        .build()
        .unwrap()
}

async fn memory_forage() -> Forage {
    let registry = Arc::new(DriverRegistry::new());
    registry.define_driver(Arc::new(MemoryDriver::new())).await.unwrap();
    forage_on(registry, &["memoryStorage"])
}

// =============================================================================
// Selection
// =============================================================================

#[tokio::test]
async fn test_fallback_skips_unsupported_and_stops_at_first_success() {
    let a = Arc::new(SimDriver::new("A").with_support(SupportCheck::Known(false)));
    let b = Arc::new(SimDriver::new("B"));
    let c = Arc::new(SimDriver::new("C"));
    let forage = forage_on(registry_with(&[&a, &b, &c]).await, &["A", "B", "C"]);

    forage.ready().await.unwrap();

    assert_eq!(forage.driver().as_deref(), Some("B"));
    assert_eq!(a.init_count(), 0);
    assert_eq!(b.init_count(), 1);
    assert_eq!(c.init_count(), 0);
    assert_eq!(forage.config_value("driver"), Some(json!("B")));
}

#[tokio::test]
async fn test_fallback_past_failing_init() {
    let a = Arc::new(SimDriver::new("A").failing_init());
    let b = Arc::new(SimDriver::new("B"));
    let forage = forage_on(registry_with(&[&a, &b]).await, &["A", "B"]);

    forage.set_item("k", "v").await.unwrap();
    assert_eq!(forage.driver().as_deref(), Some("B"));
    assert_eq!(a.init_count(), 1);
}

#[tokio::test]
async fn test_exhaustion_rejects_every_call() {
    let a = Arc::new(SimDriver::new("A").with_support(SupportCheck::Known(false)));
    let b = Arc::new(
        SimDriver::new("B")
            .with_support(SupportCheck::Probe)
            .with_probe_result(false),
    );
    let forage = forage_on(registry_with(&[&a, &b]).await, &["A", "B"]);

    assert_eq!(forage.ready().await.unwrap_err(), ForageError::NoAvailableStorageMethod);
    assert_eq!(
        forage.get_item("k").await.unwrap_err(),
        ForageError::NoAvailableStorageMethod
    );
    assert_eq!(forage.length().await.unwrap_err(), ForageError::NoAvailableStorageMethod);
    assert_eq!(forage.driver(), None);
    assert!(matches!(forage.state(), ReadinessState::Failed { .. }));
    assert_eq!(a.init_count() + b.init_count(), 0);
}

#[tokio::test]
async fn test_unknown_driver_names_are_skipped() {
    let b = Arc::new(SimDriver::new("B"));
    let forage = forage_on(registry_with(&[&b]).await, &["nope", "B"]);

    forage.ready().await.unwrap();
    assert_eq!(forage.driver().as_deref(), Some("B"));
}

#[tokio::test]
async fn test_concurrent_ready_initialises_once() {
    let clock = SimClock::new();
    let slow = Arc::new(SimDriver::new("slow").with_init_latency(clock.clone(), 250));
    let forage = forage_on(registry_with(&[&slow]).await, &["slow"]);

    let waiters = futures::future::join_all((0..16).map(|_| forage.ready()));
    let advance = async {
        tokio::task::yield_now().await;
        clock.advance_ms(250);
    };
    let (results, ()) = futures::join!(waiters, advance);

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(slow.init_count(), 1);

    forage.ready().await.unwrap();
    assert_eq!(slow.init_count(), 1);
}

#[tokio::test]
async fn test_operations_queue_behind_selection() {
    let clock = SimClock::new();
    let slow = Arc::new(SimDriver::new("slow").with_init_latency(clock.clone(), 10));
    let forage = forage_on(registry_with(&[&slow]).await, &["slow"]);

    let write = forage.set_item("k", &1);
    let advance = async {
        tokio::task::yield_now().await;
        assert_eq!(forage.state(), ReadinessState::Selecting);
        assert_eq!(forage.driver(), None);
        clock.advance_ms(10);
    };
    let (written, ()) = futures::join!(write, advance);

    assert_eq!(written.unwrap(), json!(1));
    assert_eq!(forage.get_item("k").await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_set_driver_twice_without_waiting_ends_on_second() {
    let x = Arc::new(SimDriver::new("X"));
    let y = Arc::new(SimDriver::new("Y"));
    let forage = forage_on(registry_with(&[&x, &y]).await, &["X"]);

    let first = forage.set_driver("X");
    let second = forage.set_driver("Y");
    let (first, second) = futures::join!(first, second);

    first.unwrap();
    second.unwrap();
    assert_eq!(forage.driver().as_deref(), Some("Y"));
    forage.set_item("k", &true).await.unwrap();
    assert_eq!(y.init_count(), 1);
}

#[tokio::test]
async fn test_set_driver_recovers_from_failure() {
    let off = Arc::new(SimDriver::new("off").with_support(SupportCheck::Known(false)));
    let on = Arc::new(SimDriver::new("on"));
    let forage = forage_on(registry_with(&[&off, &on]).await, &["off"]);

    assert!(forage.ready().await.is_err());
    forage.set_driver(["off", "on"]).await.unwrap();
    assert_eq!(forage.driver().as_deref(), Some("on"));
    forage.set_item("k", &1).await.unwrap();
}

// =============================================================================
// Custom Drivers
// =============================================================================

#[tokio::test]
async fn test_custom_driver_compliance() {
    let forage = Forage::builder()
        .with_registry(Arc::new(DriverRegistry::new()))
        .build()
        .unwrap();

    let nameless = forage.define_driver(Arc::new(SimDriver::new(""))).await;
    assert!(matches!(nameless, Err(ForageError::NotCompliantDriver { .. })));

    let empty = forage
        .define_driver(Arc::new(SimDriver::new("empty").with_methods(Vec::new())))
        .await;
    match empty {
        Err(ForageError::NotCompliantDriver { missing, .. }) => {
            assert_eq!(missing, Method::ALL.to_vec());
        }
        other => panic!("expected NotCompliantDriver, got {other:?}"),
    }

    let reserved = forage.define_driver(Arc::new(SimDriver::new("asyncStorage"))).await;
    assert_eq!(reserved.unwrap_err(), ForageError::name_in_use("asyncStorage"));

    assert!(forage.define_driver(Arc::new(SimDriver::new("x"))).await.unwrap());
    assert!(forage.supports("x"));
    assert_eq!(forage.get_driver("x").unwrap().name(), "x");
    assert!(matches!(
        forage.get_driver("y"),
        Err(ForageError::DriverNotFound { .. })
    ));
}

#[tokio::test]
async fn test_instances_share_registry_not_readiness() {
    let forage = memory_forage().await;
    forage.define_driver(Arc::new(SimDriver::new("late"))).await.unwrap();

    let other = forage
        .create_instance(ConfigOptions::new().with_driver("late").with_name("other"))
        .unwrap();
    assert!(other.supports("late"));

    forage.set_item("k", &1).await.unwrap();
    assert_eq!(forage.driver().as_deref(), Some("memoryStorage"));
    assert_eq!(other.state(), ReadinessState::Idle);

    other.ready().await.unwrap();
    assert_eq!(other.driver().as_deref(), Some("late"));
    assert_eq!(other.config().name, "other");
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_config_lock_after_first_operation() {
    let forage = memory_forage().await;
    forage.configure(ConfigOptions::new().with_name("app")).unwrap();
    forage.ready().await.unwrap();
    forage.configure(ConfigOptions::new().with_description("ready, unused")).unwrap();

    forage.length().await.unwrap();
    let err = forage
        .configure(ConfigOptions::new().with_name("changed"))
        .unwrap_err();

    assert_eq!(err, ForageError::ConfigLocked);
    assert_eq!(forage.config().name, "app");
    assert_eq!(forage.config().description, "ready, unused");
}

#[tokio::test]
async fn test_configure_driver_begins_new_selection() {
    let a = Arc::new(SimDriver::new("A"));
    let b = Arc::new(SimDriver::new("B"));
    let forage = forage_on(registry_with(&[&a, &b]).await, &["A"]);
    forage.ready().await.unwrap();

    forage.configure(ConfigOptions::new().with_driver("B")).unwrap();
    forage.ready().await.unwrap();
    assert_eq!(forage.driver().as_deref(), Some("B"));
}

#[tokio::test]
async fn test_new_selection_unlocks_config() {
    let forage = memory_forage().await;
    forage.set_item("k", &1).await.unwrap();
    assert!(forage.configure(ConfigOptions::new().with_size(1)).is_err());

    forage.set_driver("memoryStorage").await.unwrap();
    forage.configure(ConfigOptions::new().with_size(1)).unwrap();
    assert_eq!(forage.config().size, 1);
}

// =============================================================================
// Storage
// =============================================================================

#[tokio::test]
async fn test_round_trip_json_values() {
    let forage = memory_forage().await;
    let values = [
        json!("text"),
        json!(42),
        json!(-1.25),
        json!(true),
        Value::Null,
        json!({"nested": {"list": [1, "two", {"three": 3}]}}),
        json!([1, [2, [3]]]),
    ];

    for (index, value) in values.iter().enumerate() {
        let key = format!("k{index}");
        assert_eq!(forage.set_item(&key, value).await.unwrap(), *value);
        assert_eq!(forage.get_item(&key).await.unwrap(), *value);
    }
}

#[tokio::test]
async fn test_unit_and_none_store_null() {
    let forage = memory_forage().await;
    forage.set_item("unit", &()).await.unwrap();
    forage.set_item("none", &Option::<String>::None).await.unwrap();

    assert_eq!(forage.get_item("unit").await.unwrap(), Value::Null);
    assert_eq!(forage.get_item("none").await.unwrap(), Value::Null);
    assert_eq!(forage.length().await.unwrap(), 2);
}

#[tokio::test]
async fn test_keys_iterate_and_clear() {
    let forage = memory_forage().await;
    for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
        forage.set_item(key, &value).await.unwrap();
    }

    assert_eq!(forage.keys().await.unwrap(), vec!["a", "b", "c"]);
    assert_eq!(forage.key(2).await.unwrap().as_deref(), Some("c"));
    assert_eq!(forage.key(3).await.unwrap(), None);

    let mut total = 0;
    let none = forage
        .iterate(|value, _key, _n| {
            total += value.as_i64().unwrap_or(0);
            None
        })
        .await
        .unwrap();
    assert_eq!(none, None);
    assert_eq!(total, 6);

    let stopped = forage
        .iterate(|_value, key, n| (n == 2).then(|| json!(key)))
        .await
        .unwrap();
    assert_eq!(stopped, Some(json!("b")));

    forage.remove_item("a").await.unwrap();
    forage.remove_item("absent").await.unwrap();
    assert_eq!(forage.length().await.unwrap(), 2);
    forage.clear().await.unwrap();
    assert!(forage.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_drop_instance_defaults_to_own_store() {
    let forage = memory_forage().await;
    let sibling = forage
        .create_instance(
            ConfigOptions::new()
                .with_driver("memoryStorage")
                .with_store_name("sibling"),
        )
        .unwrap();
    forage.set_item("k", &1).await.unwrap();
    sibling.set_item("k", &2).await.unwrap();

    forage.drop_instance(DropOptions::default()).await.unwrap();
    assert_eq!(forage.get_item("k").await.unwrap(), Value::Null);
    assert_eq!(sibling.get_item("k").await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_backend_errors_pass_through() {
    let registry = Arc::new(DriverRegistry::new());
    let area = Arc::new(LocalStorageArea::new().with_quota(64));
    registry.register_builtin(Arc::new(LocalStorageDriver::new(area)));
    let forage = forage_on(registry, &["localStorageWrapper"]);

    let err = forage.set_item("big", &"x".repeat(100)).await.unwrap_err();
    assert!(matches!(
        err,
        ForageError::Store(StoreError::QuotaExceeded { quota: 64, .. })
    ));
    forage.set_item("small", &1).await.unwrap();
}

#[tokio::test]
async fn test_unserializable_value_rejects_without_locking() {
    let forage = memory_forage().await;
    let mut value = HashMap::new();
    value.insert((1u8, 2u8), 3u8);

    let err = forage.set_item("pairs", &value).await.unwrap_err();
    assert!(matches!(err, ForageError::Serialization(_)));
    assert_eq!(forage.length().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_readiness_wins_over_serialization() {
    let broken = Arc::new(SimDriver::new("broken").failing_init());
    let forage = forage_on(registry_with(&[&broken]).await, &["broken"]);
    let mut value = HashMap::new();
    value.insert((1u8, 2u8), 3u8);

    assert_eq!(
        forage.set_item("pairs", &value).await.unwrap_err(),
        ForageError::NoAvailableStorageMethod
    );
}

#[tokio::test]
async fn test_drop_instance_targets_initialised_namespace() {
    let forage = memory_forage().await;
    forage.ready().await.unwrap();
    forage
        .configure(ConfigOptions::new().with_name("renamed").with_store_name("other"))
        .unwrap();

    // The active store still lives in the namespace it was initialised with.
    forage.set_item("k", &1).await.unwrap();
    forage.drop_instance(DropOptions::default()).await.unwrap();
    assert_eq!(forage.length().await.unwrap(), 0);
    assert_eq!(forage.get_item("k").await.unwrap(), Value::Null);
}
