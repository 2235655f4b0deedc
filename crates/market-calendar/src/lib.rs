pub mod holidays;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc, Weekday,
};
use chrono_tz::Tz;
use flow_core::{MarketDataError, MarketSession, TimeWindow};
use std::collections::BTreeSet;

pub use holidays::exchange_holidays;

/// Search bound when walking back over non-trading days.
const MAX_LOOKBACK_DAYS: u32 = 366;

/// Exchange trading calendar: trading days, holidays and regular session
/// hours, with local times resolved through an IANA zone so DST is honored.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    timezone: Tz,
    open: NaiveTime,
    close: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
    exchange_rules: bool,
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::new_york()
    }
}

impl MarketCalendar {
    pub fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            timezone,
            open,
            close,
            holidays: BTreeSet::new(),
            exchange_rules: true,
        }
    }

    /// NYSE regular session, 09:30-16:00 America/New_York.
    pub fn new_york() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
        )
    }

    /// New York session hours in the named zone.
    pub fn from_timezone_name(name: &str) -> Result<Self, MarketDataError> {
        let timezone: Tz = name
            .parse()
            .map_err(|e| MarketDataError::Validation(format!("unknown timezone '{}': {}", name, e)))?;

        let mut calendar = Self::new_york();
        calendar.timezone = timezone;
        Ok(calendar)
    }

    /// Extra closure dates on top of the rule-generated ones.
    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    /// Only weekends and explicitly configured dates are closures.
    pub fn without_exchange_rules(mut self) -> Self {
        self.exchange_rules = false;
        self
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        if self.holidays.contains(&date) {
            return true;
        }
        self.exchange_rules && exchange_holidays(date.year()).contains(&date)
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// Closest trading day strictly before `date`.
    pub fn previous_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let mut candidate = date;
        for _ in 0..MAX_LOOKBACK_DAYS {
            candidate = candidate.pred_opt()?;
            if self.is_trading_day(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Regular session of `date` in UTC, `None` on non-trading days.
    pub fn session_hours(&self, date: NaiveDate) -> Option<MarketSession> {
        if !self.is_trading_day(date) {
            return None;
        }

        Some(MarketSession {
            date,
            open: self.localize(date.and_time(self.open)),
            close: self.localize(date.and_time(self.close)),
        })
    }

    pub fn is_open_at(&self, instant: DateTime<Utc>) -> bool {
        self.session_hours(self.local_date(instant))
            .is_some_and(|session| session.contains(instant))
    }

    /// Most recent session whose close is at or before `now`.
    pub fn last_completed_session(&self, now: DateTime<Utc>) -> Option<MarketSession> {
        let today = self.local_date(now);
        if let Some(session) = self.session_hours(today) {
            if session.close <= now {
                return Some(session);
            }
        }

        let previous = self.previous_trading_day(today)?;
        self.session_hours(previous)
    }

    /// Query window for delayed trade data.
    ///
    /// While the market is open this is `[now - delay - length, now - delay]`.
    /// When closed, or when that window would start before today's open, it is
    /// the last `length` of the most recent completed session.
    pub fn lookback_window(
        &self,
        now: DateTime<Utc>,
        length: Duration,
        reporting_delay: Duration,
    ) -> TimeWindow {
        let end = now - reporting_delay;
        let start = end - length;

        if self.is_open_at(now) {
            let opened_at = self.session_hours(self.local_date(now)).map(|s| s.open);
            if opened_at.is_some_and(|open| start >= open) {
                return TimeWindow::new(start, end);
            }
        }

        match self.last_completed_session(now) {
            Some(session) => TimeWindow::new(session.close - length, session.close),
            None => {
                tracing::warn!("No completed session found before {}, using delayed window", now);
                TimeWindow::new(start, end)
            }
        }
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// Resolve a local wall-clock time. Ambiguous times take the earlier
    /// instant; times in a DST gap move forward an hour.
    fn localize(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self.timezone.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => {
                let shifted = local + Duration::hours(1);
                match self.timezone.from_local_datetime(&shifted) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                    LocalResult::None => Utc.from_utc_datetime(&local),
                }
            }
        }
    }
}
