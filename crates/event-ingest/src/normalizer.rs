// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use tracing::{debug, info_span, Span};

use crate::event::Event;

/// Span carrying the identity fields of one event. Every log line written while
/// handling the event is emitted inside it.
pub fn event_span(event: &Event) -> Span {
    info_span!(
        "event",
        event_id = event.id(),
        event_subject = event.subject(),
        event_source = event.source(),
    )
}

// 0001-01-01T00:00:00Z, the zero instant producers send for an unset time
const ZERO_TIME_UNIX_SECONDS: i64 = -62_135_596_800;

fn is_zero_time(time: &DateTime<Utc>) -> bool {
    time.timestamp() == ZERO_TIME_UNIX_SECONDS && time.timestamp_subsec_nanos() == 0
}

/// Defaults a missing or zero creation time to now (UTC). Any other time is never
/// overwritten.
pub fn normalize(event: &mut Event) {
    let unset = match event.time() {
        None => true,
        Some(time) => is_zero_time(&time),
    };
    if unset {
        debug!("event does not have a timestamp");
        event.set_time(Utc::now());
    }
}
