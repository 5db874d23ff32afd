//! Aggregation semantics: stream grouping, windowed folds, and changelog
//! re-aggregation with subtraction.

use rillstream::{
    JsonCodec, Record, StreamValue, StringCodec, TopicConfig, TopologyBuilder, TopologyTestDriver,
    Windows,
};
use std::sync::Arc;
use std::time::Duration;

fn new_builder() -> TopologyBuilder {
    let _ = env_logger::builder().is_test(true).try_init();
    TopologyBuilder::new("agg-app")
        .default_key_codec(StringCodec)
        .default_value_codec(JsonCodec::new())
}

fn record(key: &str, value: i64, timestamp: i64) -> Record {
    Record::new(key, value, timestamp)
}

fn sum(a: &StreamValue, b: &StreamValue) -> StreamValue {
    StreamValue::Integer(a.as_integer().unwrap_or(0) + b.as_integer().unwrap_or(0))
}

#[test]
fn count_by_key_counts_per_key() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream.count_by_key("counts").unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 1, 0));
    driver.pipe_input("in", record("a", 2, 1));
    driver.pipe_input("in", record("b", 3, 2));

    let store = driver.key_value_store("counts").unwrap();
    assert_eq!(store.get(&StreamValue::from("a")), Some(&StreamValue::Integer(2)));
    assert_eq!(store.get(&StreamValue::from("b")), Some(&StreamValue::Integer(1)));
}

#[test]
fn count_by_key_folds_nan_keys_into_one_entry() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream.count_by_key("counts").unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", Record::new(StreamValue::Float(f64::NAN), 1, 0));
    driver.pipe_input("in", Record::new(StreamValue::Float(f64::NAN), 2, 1));

    let store = driver.key_value_store("counts").unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get(&StreamValue::Float(f64::NAN)),
        Some(&StreamValue::Integer(2))
    );
}

#[test]
fn reduce_by_key_seeds_with_the_first_value() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream.reduce_by_key(sum, "totals").unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 5, 0));
    driver.pipe_input("in", record("a", 8, 1));

    let store = driver.key_value_store("totals").unwrap();
    assert_eq!(store.get(&StreamValue::from("a")), Some(&StreamValue::Integer(13)));
}

#[test]
fn aggregation_after_select_key_groups_by_the_new_key() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    // Re-key by value parity; the pending repartition is inserted by the
    // aggregation through an internal topic.
    stream
        .select_key(|_, v| {
            StreamValue::from(if v.as_integer().unwrap_or(0) % 2 == 0 {
                "even"
            } else {
                "odd"
            })
        })
        .count_by_key("parity-counts")
        .unwrap();

    let topology = builder.build().unwrap();
    assert!(topology
        .source_topics()
        .contains("agg-app-parity-counts-repartition"));

    let mut driver = TopologyTestDriver::new(topology);
    driver.pipe_input("in", record("x", 1, 0));
    driver.pipe_input("in", record("y", 2, 1));
    driver.pipe_input("in", record("z", 3, 2));

    let store = driver.key_value_store("parity-counts").unwrap();
    assert_eq!(store.get(&StreamValue::from("odd")), Some(&StreamValue::Integer(2)));
    assert_eq!(store.get(&StreamValue::from("even")), Some(&StreamValue::Integer(1)));
}

#[test]
fn windowed_count_scopes_the_fold_per_window() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    stream
        .count_by_key_windowed(Windows::tumbling(Duration::from_millis(1000)), "win-counts")
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 1, 100));
    driver.pipe_input("in", record("a", 2, 900));
    driver.pipe_input("in", record("a", 3, 1100));

    let store = driver.key_value_store("win-counts").unwrap();
    let first_window = StreamValue::Array(vec![StreamValue::from("a"), StreamValue::Integer(0)]);
    let second_window =
        StreamValue::Array(vec![StreamValue::from("a"), StreamValue::Integer(1000)]);
    assert_eq!(store.get(&first_window), Some(&StreamValue::Integer(2)));
    assert_eq!(store.get(&second_window), Some(&StreamValue::Integer(1)));
}

#[test]
fn windowed_sum_keys_the_table_by_key_and_window_start() {
    let builder = new_builder();
    let stream = builder.stream(TopicConfig::new("in")).unwrap();
    let table = stream
        .reduce_by_key_windowed(sum, Windows::tumbling(Duration::from_millis(500)), "win-sums")
        .unwrap();
    table.to_kstream(None).to(TopicConfig::new("out")).unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("in", record("a", 4, 0));
    driver.pipe_input("in", record("a", 6, 200));

    let out = driver.read_output("out");
    assert_eq!(out.len(), 2);
    let windowed_key = StreamValue::Array(vec![StreamValue::from("a"), StreamValue::Integer(0)]);
    assert_eq!(out[1].key, windowed_key);
    assert_eq!(out[1].value, StreamValue::Integer(10));
}

#[test]
fn group_by_aggregate_never_double_counts_updates() {
    let builder = new_builder();
    let table = builder
        .table(TopicConfig::new("accounts"), "accounts-store")
        .unwrap();
    // Regroup everything under one bucket key and sum the values.
    table
        .group_by(|_, v| (StreamValue::from("all"), v.clone()))
        .aggregate(
            || StreamValue::Integer(0),
            |_, v, agg| sum(agg, v),
            |_, v, agg| {
                StreamValue::Integer(agg.as_integer().unwrap_or(0) - v.as_integer().unwrap_or(0))
            },
            "bucket-sums",
        )
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    // Key A goes 5 -> 8 -> 3; the net contribution must equal 3.
    driver.pipe_input("accounts", record("A", 5, 0));
    driver.pipe_input("accounts", record("A", 8, 1));
    driver.pipe_input("accounts", record("A", 3, 2));

    let store = driver.key_value_store("bucket-sums").unwrap();
    assert_eq!(
        store.get(&StreamValue::from("all")),
        Some(&StreamValue::Integer(3))
    );
}

#[test]
fn grouped_count_tracks_regrouped_keys() {
    let builder = new_builder();
    let table = builder
        .table(TopicConfig::new("users"), "users-store")
        .unwrap();
    // Group users by their current value (e.g. a region code).
    table
        .group_by(|k, v| (v.clone(), k.clone()))
        .count("region-counts")
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("users", record("alice", 1, 0));
    driver.pipe_input("users", record("bob", 1, 1));
    // Alice moves from region 1 to region 2: un-done on 1, re-done on 2.
    driver.pipe_input("users", record("alice", 2, 2));

    let store = driver.key_value_store("region-counts").unwrap();
    assert_eq!(store.get(&StreamValue::Integer(1)), Some(&StreamValue::Integer(1)));
    assert_eq!(store.get(&StreamValue::Integer(2)), Some(&StreamValue::Integer(1)));
}

#[test]
fn grouped_reduce_refolds_after_removal() {
    let builder = new_builder();
    let table = builder
        .table(TopicConfig::new("scores"), "scores-store")
        .unwrap();
    table
        .group_by(|_, v| (StreamValue::from("all"), v.clone()))
        .reduce(sum, "score-sum")
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("scores", record("A", 5, 0));
    driver.pipe_input("scores", record("B", 7, 1));
    driver.pipe_input("scores", record("A", 2, 2));

    let store = driver.key_value_store("score-sum").unwrap();
    // 5 + 7, then A's 5 replaced by 2: 9 total, never 14.
    assert_eq!(
        store.get(&StreamValue::from("all")),
        Some(&StreamValue::Integer(9))
    );
}

#[test]
fn to_kstream_with_a_key_mapper_remaps_and_requires_repartitioning() {
    let builder = new_builder();
    let table = builder
        .table(TopicConfig::new("updates"), "updates-store")
        .unwrap();
    let remapped = table.to_kstream(Some(Arc::new(|key: &StreamValue, _: &StreamValue| {
        StreamValue::from(format!("{}-remapped", key))
    })));
    assert!(remapped.repartition_required());
    assert!(!table.to_kstream(None).repartition_required());
    remapped.to(TopicConfig::new("out")).unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("updates", record("a", 5, 0));

    let out = driver.read_output("out");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key, StreamValue::from("a-remapped"));
    assert_eq!(out[0].value, StreamValue::Integer(5));
}

#[test]
fn to_kstream_re_aggregation_sums_every_update_event() {
    let builder = new_builder();
    let table = builder
        .table(TopicConfig::new("updates"), "updates-store")
        .unwrap();
    // Each table update becomes its own stream record; summing them counts
    // every event, not just the latest value.
    table
        .to_kstream(None)
        .aggregate_by_key(
            || StreamValue::Integer(0),
            |_, v, agg| sum(agg, v),
            "event-sums",
        )
        .unwrap();

    let mut driver = TopologyTestDriver::new(builder.build().unwrap());
    driver.pipe_input("updates", record("k", 5, 0));
    driver.pipe_input("updates", record("k", 8, 1));

    let store = driver.key_value_store("event-sums").unwrap();
    assert_eq!(store.get(&StreamValue::from("k")), Some(&StreamValue::Integer(13)));
}
