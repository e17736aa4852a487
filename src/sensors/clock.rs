//! Timestamp source

use chrono::{Datelike, Local, NaiveDateTime};
use tracing::warn;

/// Timestamp format used in radio payloads and snapshots
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%y %H:%M:%S";

/// Earliest year a synchronised clock can report
const MIN_SYNCED_YEAR: i32 = 2020;

/// Produces the timestamp attached to each sampling cycle
pub trait Clock: Send {
    fn timestamp(&self) -> String;
}

/// Host local time
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn timestamp(&self) -> String {
        format_timestamp(&Local::now().naive_local())
    }
}

/// Format `time`, warning if it predates any plausible sync
///
/// The string is returned either way; consumers carry it through unchanged.
pub fn format_timestamp(time: &NaiveDateTime) -> String {
    if time.year() < MIN_SYNCED_YEAR {
        warn!("Clock not synchronised (year {}), timestamps are placeholders", time.year());
    }
    time.format(TIMESTAMP_FORMAT).to_string()
}
