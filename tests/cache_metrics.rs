use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use artifact_console::cache::{
    CacheConfig, CacheTrigger, ChangeEvent, EventKind, EventQueue, InvalidationGroup, QueryKey,
    QueryStore, handle_event,
};
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use serial_test::serial;

static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();

fn snapshotter() -> &'static Snapshotter {
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        snapshotter
    })
}

/// Metric names paired with their `source` label, if any.
fn recorded() -> HashSet<(String, Option<String>)> {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| {
            let key = composite_key.key();
            let source = key
                .labels()
                .find(|label| label.key() == "source")
                .map(|label| label.value().to_string());
            (key.name().to_string(), source)
        })
        .collect()
}

fn seeded_store(config: &CacheConfig) -> Arc<QueryStore> {
    let store = Arc::new(QueryStore::new(config));
    for key in QueryKey::ALL {
        store.set(key.cache_key(), serde_json::json!([]));
    }
    store
}

#[test]
#[serial]
fn queue_overflow_emits_length_and_drop_metrics() {
    snapshotter();

    let queue = EventQueue::new_with_limit(1);
    queue.publish(ChangeEvent::new(EventKind::SettingsUpdated));
    queue.publish(ChangeEvent::new(EventKind::PluginInstalled));
    let drained = queue.drain(1);

    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].event.event_type, EventKind::PluginInstalled);

    let names: HashSet<String> = recorded().into_iter().map(|(name, _)| name).collect();
    for metric in [
        "console_cache_event_queue_len",
        "console_cache_event_dropped_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

#[test]
#[serial]
fn invalidation_paths_emit_expected_metric_keys() {
    snapshotter();

    let config = CacheConfig::default();
    let store = seeded_store(&config);
    let trigger = CacheTrigger::with_store(config, store.clone());

    trigger.trigger(ChangeEvent::new(EventKind::ArtifactPromoted), false);
    trigger.trigger(ChangeEvent::new(EventKind::parse("widget.rotated")), false);
    assert!(trigger.consumer().consume());

    trigger.invalidate_group(InvalidationGroup::Plugins);
    handle_event(&*store, "widget.spun");

    let recorded = recorded();
    let expected = [
        ("console_cache_invalidate_total", Some("queue")),
        ("console_cache_invalidate_total", Some("direct")),
        ("console_cache_event_unrouted_total", None),
        ("console_query_store_stale_total", None),
        ("console_cache_consume_ms", None),
    ];

    for (metric, source) in expected {
        let entry = (metric.to_string(), source.map(str::to_string));
        assert!(recorded.contains(&entry), "missing metric: {metric} {source:?}");
    }
}
