//! Operator semantics exercised through the in-memory test driver.

use rillstream::rillstream::topology::Predicate;
use rillstream::{
    JsonCodec, Record, StateStoreConfig, StreamValue, StringCodec, TopicConfig, TopologyBuilder,
    TopologyTestDriver,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

fn new_builder() -> TopologyBuilder {
    let _ = env_logger::builder().is_test(true).try_init();
    TopologyBuilder::new("ops-app")
        .default_key_codec(StringCodec)
        .default_value_codec(JsonCodec::new())
}

fn record(key: &str, value: i64, timestamp: i64) -> Record {
    Record::new(key, value, timestamp)
}

#[test]
fn filter_passes_matching_records_only() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .filter(|_, v| v.as_integer().unwrap_or(0) > 10)
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 5, 0));
    driver.pipe_input("in", record("b", 15, 1));

    let out = driver.read_output("out");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key, StreamValue::from("b"));
}

#[test]
fn filter_not_inverts_the_predicate() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .filter_not(|_, v| v.as_integer().unwrap_or(0) > 10)
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 5, 0));
    driver.pipe_input("in", record("b", 15, 1));

    let out = driver.read_output("out");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key, StreamValue::from("a"));
}

#[test]
fn map_values_never_changes_the_key() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .map_values(|v| StreamValue::Integer(v.as_integer().unwrap_or(0) * 2))
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("k1", 21, 0));

    let out = driver.read_output("out");
    assert_eq!(out[0].key, StreamValue::from("k1"));
    assert_eq!(out[0].value, StreamValue::Integer(42));
}

#[test]
fn map_may_change_both_key_and_value() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .map(|k, v| {
            (
                StreamValue::from(format!("{}!", k)),
                StreamValue::Integer(v.as_integer().unwrap_or(0) + 1),
            )
        })
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("k", 1, 0));

    let out = driver.read_output("out");
    assert_eq!(out[0].key, StreamValue::from("k!"));
    assert_eq!(out[0].value, StreamValue::Integer(2));
}

#[test]
fn flat_map_values_emits_zero_one_or_many() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .flat_map_values(|v| {
            let n = v.as_integer().unwrap_or(0);
            (0..n).map(StreamValue::Integer).collect()
        })
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 0, 0));
    driver.pipe_input("in", record("b", 3, 1));

    let out = driver.read_output("out");
    assert_eq!(out.len(), 3);
    assert!(out.iter().all(|r| r.key == StreamValue::from("b")));
}

#[test]
fn branch_routes_to_first_matching_branch_only() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();

    let lt10: Predicate = Arc::new(|_, v| v.as_integer().unwrap_or(0) < 10);
    let lt100: Predicate = Arc::new(|_, v| v.as_integer().unwrap_or(0) < 100);
    let even: Predicate = Arc::new(|_, v| v.as_integer().unwrap_or(1) % 2 == 0);
    let branches = stream.branch(vec![lt10, lt100, even]).unwrap();
    assert_eq!(branches.len(), 3);
    branches[0].to(TopicConfig::new("small")).unwrap();
    branches[1].to(TopicConfig::new("medium")).unwrap();
    branches[2].to(TopicConfig::new("even")).unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    // 42 matches lt100 and even; first match wins, so only "medium".
    driver.pipe_input("in", record("k", 42, 0));
    // 1000 is odd and >= 100: matches nothing, dropped.
    driver.pipe_input("in", record("k", 1000, 1));

    assert!(driver.read_output("small").is_empty());
    assert!(driver.read_output("even").is_empty());
    let medium = driver.read_output("medium");
    assert_eq!(medium.len(), 1);
    assert_eq!(medium[0].value, StreamValue::Integer(42));
}

#[test]
fn merge_preserves_each_inputs_relative_order() {
    let builder = new_builder();
    let a = builder.stream(TopicConfig::new("a")).unwrap();
    let b = builder.stream(TopicConfig::new("b")).unwrap();
    builder
        .merge(&[a, b])
        .unwrap()
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("a", record("a", 1, 0));
    driver.pipe_input("b", record("b", 10, 1));
    driver.pipe_input("a", record("a", 2, 2));
    driver.pipe_input("b", record("b", 20, 3));

    let out = driver.read_output("out");
    let a_values: Vec<i64> = out
        .iter()
        .filter(|r| r.key == StreamValue::from("a"))
        .map(|r| r.value.as_integer().unwrap())
        .collect();
    let b_values: Vec<i64> = out
        .iter()
        .filter(|r| r.key == StreamValue::from("b"))
        .map(|r| r.value.as_integer().unwrap())
        .collect();
    assert_eq!(a_values, vec![1, 2]);
    assert_eq!(b_values, vec![10, 20]);
}

#[test]
fn through_writes_and_re_reads_the_topic() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .select_key(|_, v| v.clone())
        .through(TopicConfig::new("rekeyed"))
        .unwrap()
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("old-key", 7, 0));

    let intermediate = driver.read_output("rekeyed");
    assert_eq!(intermediate.len(), 1);
    let out = driver.read_output("out");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key, StreamValue::Integer(7));
}

#[test]
fn for_each_observes_every_record() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    let sum = Arc::new(AtomicI64::new(0));
    let sink = sum.clone();
    stream.for_each(move |_, v| {
        sink.fetch_add(v.as_integer().unwrap_or(0), Ordering::Relaxed);
    });

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 4, 0));
    driver.pipe_input("in", record("b", 5, 1));

    assert_eq!(sum.load(Ordering::Relaxed), 9);
}

#[test]
fn writing_to_the_own_source_topic_terminates() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("cycle")).unwrap();
    stream.to(TopicConfig::new("cycle")).unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("cycle", record("a", 1, 0));

    // Re-delivery stops at the driver's loopback depth limit.
    let out = driver.read_output("cycle");
    assert!(!out.is_empty());
    assert!(out.len() < 100);
}

#[test]
fn process_accumulates_into_its_declared_store() {
    let builder = new_builder();
    builder
        .add_state_store(StateStoreConfig::new("visits"))
        .unwrap();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream.process(
        |ctx, key, _| {
            let store = ctx.store_mut("visits").unwrap();
            let seen = store.get(key).and_then(StreamValue::as_integer).unwrap_or(0) + 1;
            store.put(key.clone(), StreamValue::Integer(seen));
        },
        vec!["visits".to_string()],
    );

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 1, 0));
    driver.pipe_input("in", record("a", 2, 1));
    driver.pipe_input("in", record("b", 3, 2));

    let store = driver.key_value_store("visits").unwrap();
    assert_eq!(store.get(&StreamValue::from("a")), Some(&StreamValue::Integer(2)));
    assert_eq!(store.get(&StreamValue::from("b")), Some(&StreamValue::Integer(1)));
}

#[test]
fn transform_reads_and_writes_declared_stores() {
    let builder = new_builder();
    builder
        .add_state_store(StateStoreConfig::new("running-total"))
        .unwrap();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .transform(
            |ctx, key, value| {
                let store = ctx.store_mut("running-total").unwrap();
                let total = store.get(key).and_then(StreamValue::as_integer).unwrap_or(0)
                    + value.as_integer().unwrap_or(0);
                store.put(key.clone(), StreamValue::Integer(total));
                vec![(key.clone(), StreamValue::Integer(total))]
            },
            vec!["running-total".to_string()],
        )
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 2, 0));
    driver.pipe_input("in", record("a", 3, 1));

    let out = driver.read_output("out");
    let totals: Vec<i64> = out.iter().map(|r| r.value.as_integer().unwrap()).collect();
    assert_eq!(totals, vec![2, 5]);
    let store = driver.key_value_store("running-total").unwrap();
    assert_eq!(
        store.get(&StreamValue::from("a")),
        Some(&StreamValue::Integer(5))
    );
}

#[test]
fn transform_values_preserves_the_key() {
    let builder = new_builder();
    builder
        .add_state_store(StateStoreConfig::new("seen"))
        .unwrap();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .transform_values(
            |ctx, key, value| {
                let store = ctx.store_mut("seen").unwrap();
                let count = store.get(key).and_then(StreamValue::as_integer).unwrap_or(0) + 1;
                store.put(key.clone(), StreamValue::Integer(count));
                StreamValue::Array(vec![value.clone(), StreamValue::Integer(count)])
            },
            vec!["seen".to_string()],
        )
        .to(TopicConfig::new("out"))
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("k", 9, 0));

    let out = driver.read_output("out");
    assert_eq!(out[0].key, StreamValue::from("k"));
    assert_eq!(
        out[0].value,
        StreamValue::Array(vec![StreamValue::Integer(9), StreamValue::Integer(1)])
    );
}
