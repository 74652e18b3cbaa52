//! Referential integrity of the key, group and event tables.
//!
//! The tables are typed against each other, so most violations cannot compile.
//! What remains (empty segments, empty groups, wire names that collide or fail
//! to parse back) is checked here.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use super::events::{EventKind, KNOWN_EVENT_KINDS};
use super::groups::InvalidationGroup;
use super::keys::QueryKey;
use super::router::route;

/// One broken table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    EmptyKey { key: &'static str },
    EmptySegment { key: &'static str, index: usize },
    EmptyGroup { group: &'static str },
    UnroutedEvent { event_type: String },
    WireNameMismatch { event_type: String },
    DuplicateEventType { event_type: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::EmptyKey { key } => write!(f, "key {key} has no segments"),
            Violation::EmptySegment { key, index } => {
                write!(f, "key {key} has an empty segment at {index}")
            }
            Violation::EmptyGroup { group } => write!(f, "group {group} has no keys"),
            Violation::UnroutedEvent { event_type } => {
                write!(f, "event type {event_type} routes to no group")
            }
            Violation::WireNameMismatch { event_type } => {
                write!(f, "event type {event_type} does not parse back to itself")
            }
            Violation::DuplicateEventType { event_type } => {
                write!(f, "event type {event_type} is declared more than once")
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("cache tables have {} integrity violation(s): {}", .violations.len(), render(.violations))]
pub struct IntegrityError {
    pub violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check every table, collecting all violations rather than stopping at the first.
pub fn verify() -> Result<(), IntegrityError> {
    let mut violations = Vec::new();
    check_keys(&mut violations);
    check_groups(&mut violations);
    check_events(KNOWN_EVENT_KINDS, &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(IntegrityError { violations })
    }
}

fn check_keys(violations: &mut Vec<Violation>) {
    for key in QueryKey::ALL {
        let segments = key.segments();
        if segments.is_empty() {
            violations.push(Violation::EmptyKey { key: key.name() });
        }
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                violations.push(Violation::EmptySegment {
                    key: key.name(),
                    index,
                });
            }
        }
    }
}

fn check_groups(violations: &mut Vec<Violation>) {
    for group in InvalidationGroup::ALL {
        if group.keys().is_empty() {
            violations.push(Violation::EmptyGroup {
                group: group.name(),
            });
        }
    }
}

fn check_events(kinds: &[EventKind], violations: &mut Vec<Violation>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for kind in kinds {
        let event_type = kind.as_str();
        *seen.entry(event_type).or_default() += 1;

        if route(kind).is_none() {
            violations.push(Violation::UnroutedEvent {
                event_type: event_type.to_string(),
            });
        }
        if &EventKind::parse(event_type) != kind {
            violations.push(Violation::WireNameMismatch {
                event_type: event_type.to_string(),
            });
        }
    }

    let mut duplicates: Vec<&str> = seen
        .into_iter()
        .filter_map(|(event_type, count)| (count > 1).then_some(event_type))
        .collect();
    duplicates.sort_unstable();
    violations.extend(duplicates.into_iter().map(|event_type| {
        Violation::DuplicateEventType {
            event_type: event_type.to_string(),
        }
    }));
}
