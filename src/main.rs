use std::{process, sync::Arc, time::Duration};

use artifact_console::{
    cache::{
        CacheConfig, CacheKey, CacheTrigger, EventKind, InvalidationGroup, QueryKey, QueryStore,
        integrity, router,
    },
    config::{self, ExplainArgs, ReplayArgs},
    error::AppError,
    infra::{realtime, telemetry},
};
use serde::Serialize;
use serde_json::json;
use tokio::io::BufReader;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args.command.unwrap_or(config::Command::Watch);

    telemetry::init(&settings.logging)?;

    let cache_config = CacheConfig::from(&settings.cache);

    match command {
        config::Command::Check => run_check(),
        config::Command::Explain(args) => {
            warn_on_integrity_violations();
            run_explain(args)
        }
        config::Command::Groups => {
            warn_on_integrity_violations();
            run_groups()
        }
        config::Command::Replay(args) => {
            warn_on_integrity_violations();
            run_replay(cache_config, args).await
        }
        config::Command::Watch => {
            warn_on_integrity_violations();
            run_watch(cache_config).await
        }
    }
}

fn warn_on_integrity_violations() {
    if let Err(err) = integrity::verify() {
        warn!(
            target = "artifact_console::startup",
            violations = err.violations.len(),
            error = %err,
            "Cache tables failed integrity verification"
        );
    }
}

fn run_check() -> Result<(), AppError> {
    integrity::verify()?;
    info!(
        target = "artifact_console::check",
        keys = QueryKey::ALL.len(),
        groups = InvalidationGroup::ALL.len(),
        events = router::event_routes().count(),
        "Cache tables are consistent"
    );
    print_json(&json!({
        "ok": true,
        "keys": QueryKey::ALL.len(),
        "groups": InvalidationGroup::ALL.len(),
        "events": router::event_routes().count(),
    }))
}

fn run_explain(args: ExplainArgs) -> Result<(), AppError> {
    print_json(&explain_report(&args.event_type))
}

/// What the router does with `event_type`, byte for byte as given.
fn explain_report(event_type: &str) -> serde_json::Value {
    let kind = EventKind::parse(event_type);
    let group = router::route(&kind);
    let keys = group.map(InvalidationGroup::cache_keys).unwrap_or_default();

    json!({
        "eventType": kind.as_str(),
        "known": kind.is_known(),
        "group": group.map(InvalidationGroup::name),
        "keys": keys,
    })
}

#[derive(Serialize)]
struct GroupRow {
    name: &'static str,
    keys: Vec<KeyRow>,
    events: Vec<&'static str>,
}

#[derive(Serialize)]
struct KeyRow {
    name: &'static str,
    key: CacheKey,
}

fn run_groups() -> Result<(), AppError> {
    let rows: Vec<GroupRow> = InvalidationGroup::ALL
        .into_iter()
        .map(|group| GroupRow {
            name: group.name(),
            keys: group
                .keys()
                .iter()
                .map(|key| KeyRow {
                    name: key.name(),
                    key: key.cache_key(),
                })
                .collect(),
            events: router::event_routes()
                .filter_map(|(event_type, routed)| (routed == group).then_some(event_type))
                .collect(),
        })
        .collect();

    print_json(&rows)
}

async fn run_replay(cache_config: CacheConfig, args: ReplayArgs) -> Result<(), AppError> {
    let file = tokio::fs::File::open(&args.file).await?;
    let (store, trigger) = seeded_runtime(cache_config);

    let events = realtime::decode_frames(BufReader::new(file));
    let forwarded = realtime::pump(events, &trigger, args.eager).await;
    let batches = trigger.consumer().consume_all();

    info!(
        target = "artifact_console::replay",
        file = %args.file.display(),
        forwarded,
        batches,
        "Replay finished"
    );

    print_summary(&store, forwarded)
}

async fn run_watch(cache_config: CacheConfig) -> Result<(), AppError> {
    let interval_ms = cache_config.auto_consume_interval_ms;
    let (store, trigger) = seeded_runtime(cache_config);

    let consume_handle = {
        let trigger = trigger.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.tick().await;
            loop {
                interval.tick().await;
                trigger.consumer().consume();
            }
        })
    };

    info!(target = "artifact_console::watch", interval_ms, "Watching stdin for change events");
    let events = realtime::decode_frames(BufReader::new(tokio::io::stdin()));
    let forwarded = realtime::pump(events, &trigger, false).await;

    consume_handle.abort();
    let _ = consume_handle.await;
    let batches = trigger.consumer().consume_all();

    info!(target = "artifact_console::watch", forwarded, batches, "Change-event feed closed");

    print_summary(&store, forwarded)
}

/// A query store holding one fresh, observed entry per registered key.
fn seeded_runtime(cache_config: CacheConfig) -> (Arc<QueryStore>, Arc<CacheTrigger>) {
    let store = Arc::new(QueryStore::new(&cache_config));
    for key in QueryKey::ALL {
        let cache_key = key.cache_key();
        store.set(cache_key.clone(), serde_json::Value::Null);
        store.subscribe(&cache_key);
    }
    let trigger = Arc::new(CacheTrigger::with_store(cache_config, store.clone()));
    (store, trigger)
}

fn print_summary(store: &QueryStore, forwarded: usize) -> Result<(), AppError> {
    print_json(&json!({
        "events": forwarded,
        "stale": store.stale_keys(),
        "refetch": store.take_refetches(),
    }))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
