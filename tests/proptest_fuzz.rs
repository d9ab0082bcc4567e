//! Property-based tests (fuzzing) for record engine resilience.
//!
//! Uses proptest to generate random/malformed inputs and verify the engine
//! never panics, only returns clean errors, and that counters converge.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use record_sync::schema::{AttributeSpec, AttributeType, ModelDefinition, ModelRegistry};
use record_sync::{RecordEngine, RecordError, Selection, Tiers};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        (-1.0e6..1.0e6f64).prop_map(|f| json!(f)),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        3,   // depth
        32,  // max nodes
        6,   // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

/// Objects keyed by a mix of declared and undeclared attribute names
fn record_data_strategy() -> impl Strategy<Value = Map<String, Value>> {
    let name = prop_oneof![
        Just("id".to_string()),
        Just("title".to_string()),
        Just("rank".to_string()),
        Just("ratio".to_string()),
        Just("flag".to_string()),
        Just("born".to_string()),
        Just("meta".to_string()),
        "[a-z]{1,8}",
    ];
    prop::collection::hash_map(name, arbitrary_json_strategy(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn engine() -> RecordEngine {
    let registry = ModelRegistry::builder()
        .define(
            "Item",
            ModelDefinition::new("items")
                .attribute("id", AttributeSpec::new(AttributeType::String).primary())
                .attribute("title", AttributeSpec::new(AttributeType::String).min(1.0).max(40.0))
                .attribute("rank", AttributeSpec::new(AttributeType::Integer).cached())
                .attribute("ratio", AttributeSpec::new(AttributeType::Float))
                .attribute("flag", AttributeSpec::new(AttributeType::Boolean))
                .attribute("born", AttributeSpec::new(AttributeType::Datetime))
                .attribute("meta", AttributeSpec::new(AttributeType::Json))
                .attribute("hits", AttributeSpec::new(AttributeType::Integer).counter()),
        )
        .unwrap()
        .build();
    RecordEngine::new(registry, Tiers::in_memory())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary input either saves or fails validation; it never panics and
    /// never reaches a tier error.
    #[test]
    fn arbitrary_input_saves_or_fails_cleanly(data in record_data_strategy()) {
        let engine = engine();
        runtime().block_on(async {
            let mut record = engine.create("Item", Value::Object(data)).unwrap();
            let pending = record.has_changes();
            match engine.save(&mut record).await {
                Ok(()) => {
                    prop_assert!(!pending || !record.is_new());
                    prop_assert!(!record.has_changes());
                }
                Err(RecordError::Validation(errors)) => {
                    prop_assert!(!errors.is_empty());
                    prop_assert!(record.has_changes());
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            Ok(())
        })?;
    }

    /// Whatever sequence of increments and decrements is applied across
    /// saves, the durable counter ends at their sum.
    #[test]
    fn counter_deltas_converge(steps in prop::collection::vec((-1000i64..1000, any::<bool>()), 1..20)) {
        let engine = engine();
        runtime().block_on(async {
            let mut record = engine.get("Item", "c").unwrap();
            let mut expected = 0i64;
            for (amount, save_now) in &steps {
                if *amount >= 0 {
                    record.incr("hits", *amount).unwrap();
                } else {
                    record.decr("hits", -*amount).unwrap();
                }
                expected += amount;
                if *save_now {
                    engine.save(&mut record).await.unwrap();
                }
            }
            engine.save(&mut record).await.unwrap();

            let mut fresh = engine.get("Item", "c").unwrap();
            match engine.fetch(&mut fresh, &Selection::attributes(["hits"])).await {
                Ok(()) => prop_assert_eq!(fresh.get("hits").unwrap().unwrap_or(json!(0)), json!(expected)),
                // Every delta cancelled out, nothing was ever written
                Err(RecordError::NotFound { .. }) => prop_assert_eq!(expected, 0),
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            Ok(())
        })?;
    }

    /// Values that save cleanly read back unchanged through the output stage.
    #[test]
    fn saved_strings_read_back(title in "[a-zA-Z0-9 ]{1,40}") {
        let engine = engine();
        runtime().block_on(async {
            let mut record = engine.create("Item", json!({"title": title.clone()})).unwrap();
            engine.save(&mut record).await.unwrap();

            let mut fresh = engine.get("Item", record.id().cloned().unwrap()).unwrap();
            engine.fetch(&mut fresh, &Selection::attributes(["title"])).await.unwrap();
            prop_assert_eq!(fresh.get("title").unwrap(), Some(json!(title)));
            Ok(())
        })?;
    }

    /// Unknown names are never stored on a record.
    #[test]
    fn undeclared_names_are_dropped(name in "[a-z]{9,12}", value in arbitrary_json_strategy()) {
        let engine = engine();
        let mut record = engine.create("Item", Value::Null).unwrap();
        record.set(&name, value);
        prop_assert!(record.changed_attributes().is_empty());
        prop_assert!(record.get(&name).is_err());
    }
}
