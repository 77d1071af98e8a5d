/// Integration tests for a single blackboard.
///
/// These tests exercise the public API end to end on one blackboard:
/// key registration, time-buffered writes, nearest-in-time reads, triggers,
/// batches and configuration.
use blackboard::prelude::*;
use blackboard::{BlackboardStats, HistoryEntry};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn local(id: &str) -> Blackboard {
    Blackboard::with_id(id, LocalBus::shared())
}

#[test]
fn test_basic_set_get_workflow() {
    let bb = local("robot1");
    let pose = bb.add_key("pose");

    bb.set_value(pose, 12.0, Pose::planar(1.0, 2.0, 0.25)).unwrap();

    let seen = bb.get_value_as::<Pose>(pose, 12.0).unwrap().unwrap();
    assert_eq!(seen.x, 1.0);
    assert_eq!(seen.y, 2.0);
    assert_eq!(seen.yaw, 0.25);
}

#[test]
fn test_nearest_in_time_reads() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    for t in [10, 20, 30] {
        bb.set_value(x, t as f64, t).unwrap();
    }

    // Latest at or before the query time wins.
    assert_eq!(bb.get_value(x, 15.0), Some(Value::Int(10)));
    assert_eq!(bb.get_value(x, 29.999), Some(Value::Int(20)));
    assert_eq!(bb.get_value(x, 30.0), Some(Value::Int(30)));
    assert_eq!(bb.get_value(x, 1e9), Some(Value::Int(30)));

    // Before the oldest entry, fall back to the earliest one after.
    assert_eq!(bb.get_value(x, 5.0), Some(Value::Int(10)));
    assert_eq!(bb.get_value(x, -100.0), Some(Value::Int(10)));
}

#[test]
fn test_empty_key_reads_nothing() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    assert_eq!(bb.get_value(x, 0.0), None);
    assert_eq!(bb.get_value_as::<i64>(x, 0.0).unwrap(), None);
    assert!(bb.latest(x).is_none());
    assert!(bb.history(x).unwrap().is_empty());
}

#[test]
fn test_out_of_order_writes_are_sorted() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    bb.set_value(x, 30.0, 30).unwrap();
    bb.set_value(x, 10.0, 10).unwrap();
    bb.set_value(x, 20.0, 20).unwrap();

    let times: Vec<f64> = bb
        .history(x)
        .unwrap()
        .iter()
        .map(|e| e.timestamp.as_secs())
        .collect();
    assert_eq!(times, vec![10.0, 20.0, 30.0]);
    assert_eq!(bb.get_value(x, 25.0), Some(Value::Int(20)));
}

#[test]
fn test_bounded_history_evicts_oldest() {
    let bb = local("robot1");
    let x = bb.add_key_with("x", None, 3);
    for i in 0..10 {
        bb.set_value(x, i as f64, i).unwrap();
    }

    assert_eq!(bb.entry_count(x), 3);
    let oldest = bb.history(x).unwrap().remove(0);
    assert_eq!(oldest, HistoryEntry::new(Timestamp::new(7.0), Value::Int(7)));

    // A query before the retained window resolves to the oldest survivor.
    assert_eq!(bb.get_value(x, 0.0), Some(Value::Int(7)));
}

#[test]
fn test_late_write_older_than_window_is_evicted() {
    let bb = local("robot1");
    let x = bb.add_key_with("x", None, 2);
    bb.set_value(x, 10.0, 10).unwrap();
    bb.set_value(x, 20.0, 20).unwrap();
    bb.set_value(x, 5.0, 5).unwrap();

    assert_eq!(bb.entry_count(x), 2);
    assert_eq!(bb.get_value(x, 0.0), Some(Value::Int(10)));
}

#[test]
fn test_duplicate_timestamps_are_all_kept() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    bb.set_value(x, 1.0, "first").unwrap();
    bb.set_value(x, 1.0, "second").unwrap();

    assert_eq!(bb.entry_count(x), 2);
    // The later insert sits after the earlier one.
    assert_eq!(bb.get_value(x, 1.0), Some(Value::from("second")));
}

#[test]
fn test_add_key_returns_same_key_for_same_name() {
    let bb = local("robot1");
    let a = bb.add_key("pose");
    let b = bb.add_key("battery");
    let again = bb.add_key("pose");

    assert_eq!(a, again);
    assert_ne!(a, b);
    assert_eq!(bb.key_names(), vec!["pose", "battery"]);
    assert_eq!(bb.find_key("battery"), Some(b));
    assert_eq!(bb.find_key("map"), None);
}

#[test]
fn test_keys_are_local_to_their_blackboard() {
    let one = local("robot1");
    let two = local("robot2");
    let a = one.add_key("a");
    let b = one.add_key("b");
    two.add_key("b");

    // Keys of another blackboard are only meaningful by index.
    assert_eq!(two.find_key("b").map(|k| k.index()), Some(0));
    assert_eq!(b.index(), 1);
    assert!(two.set_value(b, 1.0, 1).is_err());
    assert_eq!(two.get_value(b, 1.0), None);
    assert!(one.set_value(a, 1.0, 1).is_ok());
}

#[test]
fn test_two_triggers_fire_once_per_write() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        bb.add_trigger(x, move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    bb.set_value(x, 1.0, 1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    bb.set_value(x, 2.0, 2).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_trigger_only_fires_for_its_key() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    let y = bb.add_key("y");
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    bb.add_trigger(x, move |_, key| sink.lock().push(key)).unwrap();

    bb.set_value(y, 1.0, 1).unwrap();
    bb.set_value(x, 1.0, 1).unwrap();
    assert_eq!(*seen.lock(), vec![x]);
}

#[test]
fn test_trigger_reads_new_value() {
    let bb = local("robot1");
    let battery = bb.add_key("battery");
    let observed = Arc::new(parking_lot::Mutex::new(None));

    let sink = Arc::clone(&observed);
    bb.add_trigger(battery, move |bb, key| {
        *sink.lock() = bb.latest(key).map(|e| e.value);
    })
    .unwrap();

    bb.set_value(battery, 3.0, 0.42).unwrap();
    assert_eq!(*observed.lock(), Some(Value::Float(0.42)));
}

#[test]
fn test_type_mismatch_is_reported() {
    let bb = local("robot1");
    let name = bb.add_key("name");
    bb.set_value(name, 1.0, "atlas").unwrap();

    match bb.get_value_as::<i64>(name, 1.0) {
        Err(BlackboardError::TypeMismatch { expected, found }) => {
            assert_eq!(expected, ValueKind::Int);
            assert_eq!(found, ValueKind::Text);
        }
        other => panic!("expected type mismatch, got {:?}", other),
    }
    assert_eq!(
        bb.get_value_as::<String>(name, 1.0).unwrap().as_deref(),
        Some("atlas")
    );
}

#[test]
fn test_value_kinds_can_change_over_time() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    bb.set_value(x, 1.0, 1).unwrap();
    bb.set_value(x, 2.0, json!({"mode": "dock"})).unwrap();

    assert_eq!(bb.get_value(x, 1.0).map(|v| v.kind()), Some(ValueKind::Int));
    assert_eq!(bb.get_value(x, 2.0).map(|v| v.kind()), Some(ValueKind::Json));
}

#[test]
fn test_get_range() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    for i in 0..10 {
        bb.set_value(x, i as f64, i).unwrap();
    }

    let values: Vec<Value> = bb
        .get_range(x, 2.5, 5.0)
        .unwrap()
        .into_iter()
        .map(|e| e.value)
        .collect();
    assert_eq!(values, vec![Value::Int(3), Value::Int(4), Value::Int(5)]);
    assert!(bb.get_range(x, 20.0, 30.0).unwrap().is_empty());
}

#[test]
fn test_batch_update_is_all_or_nothing() {
    let bb = local("robot1");
    let pose = bb.add_key("pose");
    let battery = bb.add_key("battery");

    bb.apply(
        Update::new()
            .set(pose, 1.0, Pose::planar(0.0, 0.0, 0.0))
            .set(battery, 1.0, 0.9),
    )
    .unwrap();
    assert_eq!(bb.stats().total_entries, 2);

    let foreign = local("robot2");
    let stray = {
        foreign.add_key("a");
        foreign.add_key("b");
        foreign.add_key("c")
    };
    let result = bb.apply(Update::new().set(pose, 2.0, Pose::default()).set(stray, 2.0, 1));
    assert!(matches!(result, Err(BlackboardError::UnknownKey { key: 2 })));
    assert_eq!(bb.entry_count(pose), 1);
}

#[test]
fn test_clones_share_state() {
    let bb = local("robot1");
    let clone = bb.clone();
    let x = bb.add_key("x");

    clone.set_value(x, 1.0, true).unwrap();
    assert_eq!(bb.get_value(x, 1.0), Some(Value::Bool(true)));
    assert_eq!(clone.find_key("x"), Some(x));
}

#[test]
fn test_chrono_timestamps() {
    let bb = local("robot1");
    let x = bb.add_key("x");
    let now = chrono::Utc::now();
    let earlier = now - chrono::Duration::seconds(5);

    bb.set_value(x, earlier, "earlier").unwrap();
    bb.set_value(x, now, "now").unwrap();

    let halfway = now - chrono::Duration::seconds(2);
    assert_eq!(bb.get_value(x, halfway), Some(Value::from("earlier")));
}

#[test]
fn test_from_config() {
    let config = BlackboardConfig::from_json_str(
        r#"{
            "id": "robot1",
            "default_capacity": 4,
            "peers": ["robot2", "robot3"],
            "keys": [
                { "name": "pose", "serializer": "bincode" },
                { "name": "map", "capacity": 1, "serializer": "json" },
                { "name": "debug" }
            ]
        }"#,
    )
    .unwrap();

    let bb = Blackboard::from_config(&config, LocalBus::shared()).unwrap();
    assert_eq!(bb.id(), "robot1");
    assert_eq!(bb.key_names(), vec!["pose", "map", "debug"]);
    assert_eq!(bb.peers(), vec!["robot2", "robot3"]);

    let pose = bb.find_key("pose").unwrap();
    let map = bb.find_key("map").unwrap();
    for i in 0..10 {
        bb.set_value(pose, i as f64, i).unwrap();
        bb.set_value(map, i as f64, i).unwrap();
    }
    assert_eq!(bb.entry_count(pose), 4);
    assert_eq!(bb.entry_count(map), 1);
}

#[test]
fn test_from_config_generates_id() {
    let config = BlackboardConfig::new().key(KeyConfig::new("pose"));
    let bb = Blackboard::from_config(&config, LocalBus::shared()).unwrap();
    assert!(bb.id().starts_with("bb-"));
    assert_eq!(bb.key_count(), 1);
}

#[test]
fn test_from_config_rejects_invalid() {
    let config = BlackboardConfig::new()
        .key(KeyConfig::new("pose"))
        .key(KeyConfig::new("pose").serializer(SerializerKind::Json));
    assert!(matches!(
        Blackboard::from_config(&config, LocalBus::shared()),
        Err(BlackboardError::InvalidConfig { .. })
    ));
}

#[test]
fn test_stats_on_fresh_blackboard() {
    let bb = local("robot1");
    assert_eq!(bb.stats(), BlackboardStats::default());
}
