//! services/reader_host/src/adapters/clock.rs
//!
//! Wall-clock implementation of the `Clock` port.

use chrono::{DateTime, Local, NaiveDate, Utc};
use note_access_core::ports::Clock;

/// Reads the host's clock. "Today" is the local calendar day.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
