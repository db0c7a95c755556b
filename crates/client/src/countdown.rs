// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! Derived remaining time for the current round.
//!
//! Canonical duration format is `HH:MM:SS` (hours may exceed 24; minutes
//! and seconds must be below 60).

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::model::Round;

/// Parse a `HH:MM:SS` duration into whole seconds.
pub fn parse_duration(duration: &str) -> Option<i64> {
    let mut parts = duration.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Whole seconds until the round's nominal end at `now`.
///
/// Deliberately not clamped: a negative value means the round is past its
/// end and the next round's content is still generating — callers use it to
/// disable interactive affordances. A missing round (or unparseable
/// duration) yields `0`.
pub fn seconds_left(round: Option<&Round>, now: DateTime<Utc>) -> i64 {
    let Some(round) = round else { return 0 };
    let Some(duration) = parse_duration(&round.duration) else {
        warn!(round = %round.id, duration = %round.duration, "unparseable round duration");
        return 0;
    };
    (round.created + Duration::seconds(duration) - now).num_seconds()
}

/// Human-readable remaining time for display, e.g. `"1h 04m 09s"`.
pub fn time_left_label(round: Option<&Round>, now: DateTime<Utc>) -> String {
    let left = seconds_left(round, now);
    if round.is_none() {
        return String::new();
    }
    if left <= 0 {
        return "Round ended".to_owned();
    }
    let (hours, minutes, seconds) = (left / 3600, left % 3600 / 60, left % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}

#[cfg(test)]
#[path = "countdown_tests.rs"]
mod tests;
