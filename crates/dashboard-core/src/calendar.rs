use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::DashboardError;

/// Weekday/time-window rule defining when a market is open.
///
/// The instant is converted to the exchange's local civil time through the
/// tz database, so the window stays correct across daylight-saving
/// transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeCalendar {
    pub tz: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl ExchangeCalendar {
    pub fn new(tz: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self { tz, open, close }
    }

    /// NSE continuous session, 09:15-15:30 IST.
    pub fn nse() -> Self {
        Self::new(
            chrono_tz::Asia::Kolkata,
            NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
        )
    }

    /// NYSE/NASDAQ regular session, 09:30-16:00 Eastern.
    pub fn nyse() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
    }

    /// Parse a window of the form "09:30-16:00" for the given tz name.
    pub fn parse(tz: &str, window: &str) -> Result<Self, DashboardError> {
        let tz: Tz = tz
            .parse()
            .map_err(|_| DashboardError::Config(format!("Unknown timezone: {}", tz)))?;

        let (open, close) = window
            .split_once('-')
            .ok_or_else(|| DashboardError::Config(format!("Invalid market window: {}", window)))?;

        let parse_time = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|_| DashboardError::Config(format!("Invalid time of day: {}", s)))
        };

        Ok(Self::new(tz, parse_time(open)?, parse_time(close)?))
    }

    /// True iff `at` falls on a local weekday inside [open, close).
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.tz);

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let time = local.time();
        time >= self.open && time < self.close
    }

    pub fn is_open(&self) -> bool {
        self.is_open_at(Utc::now())
    }

    /// The calendar date of `at` in the exchange's timezone. Daily refresh
    /// gating compares these, so the day rolls over at local midnight, not
    /// UTC midnight.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }
}
