//! Realtime change-event transport.
//!
//! Frames are newline-delimited JSON `ChangeEvent`s. Blank lines are keep-alives;
//! malformed frames are logged and skipped so one bad producer cannot stall
//! the feed.

use std::pin::pin;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::cache::{CacheTrigger, ChangeEvent};

use super::error::InfraError;

/// Decode a line-oriented reader into a stream of change events.
///
/// The stream ends at EOF or on the first read error.
pub fn decode_frames<R>(reader: R) -> impl Stream<Item = ChangeEvent>
where
    R: AsyncBufRead + Unpin,
{
    stream! {
        let mut segments = reader.split(b'\n');
        let mut line_no = 0usize;
        loop {
            line_no += 1;
            let segment = match segments.next_segment().await {
                Ok(Some(segment)) => segment,
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        target = "artifact_console::infra::realtime",
                        line = line_no,
                        error = %err,
                        "Change-event transport read failed; closing feed"
                    );
                    break;
                }
            };

            match decode_segment(line_no, segment) {
                Ok(Some(event)) => yield event,
                Ok(None) => {}
                Err(err) => warn!(
                    target = "artifact_console::infra::realtime",
                    error = %err,
                    "Skipping malformed change-event frame"
                ),
            }
        }
    }
}

fn decode_segment(line_no: usize, segment: Vec<u8>) -> Result<Option<ChangeEvent>, InfraError> {
    let frame = String::from_utf8(segment)
        .map_err(|err| InfraError::frame(line_no, format!("frame is not valid UTF-8: {err}")))?;
    parse_frame(line_no, &frame)
}

/// Parse one frame; `Ok(None)` for keep-alive lines.
pub fn parse_frame(line_no: usize, frame: &str) -> Result<Option<ChangeEvent>, InfraError> {
    let frame = frame.trim();
    if frame.is_empty() {
        return Ok(None);
    }
    ChangeEvent::from_frame(frame)
        .map(Some)
        .map_err(|err| InfraError::frame(line_no, err.to_string()))
}

/// Forward every event of `events` into `trigger`, returning how many were forwarded.
pub async fn pump<S>(events: S, trigger: &CacheTrigger, consume_now: bool) -> usize
where
    S: Stream<Item = ChangeEvent>,
{
    let mut events = pin!(events);
    let mut forwarded = 0usize;

    while let Some(event) = events.next().await {
        debug!(
            target = "artifact_console::infra::realtime",
            event_id = %event.id,
            event_type = %event.event_type,
            "Change event received"
        );
        trigger.trigger(event, consume_now);
        forwarded += 1;
    }

    forwarded
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;
    use tokio::io::BufReader;

    use super::*;
    use crate::cache::{CacheConfig, EventKind, QueryKey, QueryStore};

    fn fixture(config: CacheConfig) -> (Arc<QueryStore>, CacheTrigger) {
        let store = Arc::new(QueryStore::new(&config));
        for key in QueryKey::ALL {
            store.set(key.cache_key(), serde_json::json!([]));
        }
        let trigger = CacheTrigger::with_store(config, store.clone());
        (store, trigger)
    }

    #[tokio::test]
    async fn decode_skips_blank_and_malformed_lines() {
        let input: &[u8] = b"{\"eventType\":\"repository.created\"}\n\
            \n\
            not json\n\
            {\"eventType\":\"widget.rotated\",\"entityId\":\"w-1\"}\n";
        let events: Vec<ChangeEvent> = decode_frames(BufReader::new(input)).collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventKind::RepositoryCreated);
        assert_eq!(events[1].event_type, EventKind::Other("widget.rotated".to_string()));
        assert_eq!(events[1].entity_id.as_deref(), Some("w-1"));
    }

    #[tokio::test]
    async fn decode_skips_frames_that_are_not_utf8() {
        let input: &[u8] = b"{\"eventType\":\"repository.created\"}\n\
            \xff\xfe\n\
            {\"eventType\":\"settings.updated\"}\n";
        let kinds: Vec<EventKind> = decode_frames(BufReader::new(input))
            .map(|event| event.event_type)
            .collect()
            .await;

        assert_eq!(kinds, vec![EventKind::RepositoryCreated, EventKind::SettingsUpdated]);
    }

    #[test]
    fn non_utf8_segment_reports_line_number() {
        let err = decode_segment(3, vec![0xff, 0xfe]).expect_err("invalid UTF-8");
        assert!(matches!(err, InfraError::Frame { line: 3, .. }));
    }

    #[test]
    fn keep_alive_frame_yields_nothing() {
        assert!(parse_frame(1, "   ").expect("blank frame").is_none());
    }

    #[test]
    fn malformed_frame_reports_line_number() {
        let err = parse_frame(7, "{\"entityId\":\"x\"}").expect_err("missing eventType");
        assert!(matches!(err, InfraError::Frame { line: 7, .. }));
    }

    #[tokio::test]
    async fn pump_forwards_and_invalidates() {
        let (store, trigger) = fixture(CacheConfig::default());
        let events = stream::iter(vec![
            ChangeEvent::new(EventKind::TokenRevoked),
            ChangeEvent::new(EventKind::PluginEnabled),
        ]);

        let forwarded = pump(events, &trigger, true).await;

        assert_eq!(forwarded, 2);
        assert_eq!(
            store.stale_keys(),
            vec![QueryKey::ApiTokens.cache_key(), QueryKey::Plugins.cache_key()]
        );
    }

    #[tokio::test]
    async fn pump_without_consume_leaves_events_queued() {
        let (store, trigger) = fixture(CacheConfig::default());
        let events = stream::iter(vec![ChangeEvent::new(EventKind::BackupCompleted)]);

        assert_eq!(pump(events, &trigger, false).await, 1);
        assert_eq!(trigger.queue().len(), 1);
        assert!(store.stale_keys().is_empty());

        trigger.consumer().consume();
        assert!(store.is_stale(&QueryKey::Backups.cache_key()).unwrap_or(false));
    }

    #[tokio::test]
    async fn pump_counts_events_even_when_disabled() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let (store, trigger) = fixture(config);
        let events = stream::iter(vec![ChangeEvent::new(EventKind::RepositoryDeleted)]);

        assert_eq!(pump(events, &trigger, true).await, 1);
        assert!(trigger.queue().is_empty());
        assert!(store.stale_keys().is_empty());
    }
}
