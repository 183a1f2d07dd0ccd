//! Booking window and cancellation rules.
//!
//! Every surface (customer reservation form, customer reservation list,
//! vendor reservations dashboard) goes through this module instead of
//! carrying its own copy of the date arithmetic. All functions are pure:
//! `now` is always passed in, never read from a clock.

use std::env;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{STATUS_CONFIRMED, STATUS_PENDING};

/// Storage format for arrival/expiry instants (naive venue-local time).
pub const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, INSTANT_FORMAT).ok()
}

pub fn format_instant(instant: NaiveDateTime) -> String {
    instant.format(INSTANT_FORMAT).to_string()
}

#[derive(Clone, Debug)]
pub struct BookingPolicy {
    /// First admissible arrival time of the day.
    pub open: NaiveTime,
    /// Last admissible arrival time of the day, inclusive.
    pub close: NaiveTime,
    /// Minimum head start for same-day arrivals.
    pub min_lead: Duration,
    /// Cancellation closes this long before the arrival instant.
    pub cancel_cutoff: Duration,
    /// Tolerance after the arrival instant before a reservation expires.
    pub grace: Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            open: hm(7, 0),
            close: hm(17, 0),
            min_lead: Duration::minutes(10),
            cancel_cutoff: Duration::minutes(10),
            grace: Duration::minutes(20),
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn env_time(key: &str) -> Option<NaiveTime> {
    let raw = env::var(key).ok()?;
    NaiveTime::parse_from_str(&raw, "%H:%M").ok()
}

fn env_minutes(key: &str) -> Option<Duration> {
    let raw = env::var(key).ok()?;
    raw.parse::<i64>().ok().map(Duration::minutes)
}

impl BookingPolicy {
    /// Defaults overridden by `BOOKING_*` environment variables.
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        if let Some(open) = env_time("BOOKING_OPEN") {
            policy.open = open;
        }
        if let Some(close) = env_time("BOOKING_CLOSE") {
            policy.close = close;
        }
        if let Some(lead) = env_minutes("BOOKING_MIN_LEAD_MIN") {
            policy.min_lead = lead;
        }
        if let Some(cutoff) = env_minutes("BOOKING_CANCEL_CUTOFF_MIN") {
            policy.cancel_cutoff = cutoff;
        }
        if let Some(grace) = env_minutes("BOOKING_GRACE_MIN") {
            policy.grace = grace;
        }
        policy
    }

    /// Checks a candidate arrival against the booking window.
    ///
    /// The day is checked before the time of day: a request for next week
    /// is rejected as out of range even if its time would be fine. The
    /// closing boundary and the `now + min_lead` boundary are both
    /// inclusive.
    pub fn validate_arrival(
        &self,
        day: NaiveDate,
        time: NaiveTime,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime, ArrivalRejection> {
        let today = now.date();
        let tomorrow = today + Duration::days(1);
        if day != today && day != tomorrow {
            return Err(ArrivalRejection::DayOutOfRange);
        }
        if time < self.open {
            return Err(ArrivalRejection::BeforeOpening);
        }
        if time > self.close {
            return Err(ArrivalRejection::AfterClosing);
        }
        let candidate = day.and_time(time);
        if day == today && candidate < now + self.min_lead {
            return Err(ArrivalRejection::TooSoon);
        }
        Ok(candidate)
    }

    pub fn can_cancel(
        &self,
        status: &str,
        arrival: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> bool {
        self.cancel_block_reason(status, arrival, now).is_none()
    }

    /// Why the holder may not cancel right now, if they may not.
    ///
    /// A reservation without a recorded arrival instant can always be
    /// canceled while its status allows it.
    pub fn cancel_block_reason(
        &self,
        status: &str,
        arrival: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Option<CancelBlock> {
        if status != STATUS_PENDING && status != STATUS_CONFIRMED {
            return Some(CancelBlock::WrongStatus);
        }
        match arrival {
            None => None,
            Some(at) if now < at - self.cancel_cutoff => None,
            Some(_) => Some(CancelBlock::TooCloseToArrival),
        }
    }

    /// Vendors may approve or reject only on the arrival day, from
    /// opening time on. Reservations for tomorrow unlock tomorrow.
    pub fn can_decide(&self, arrival: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
        self.decide_block_reason(arrival, now).is_none()
    }

    pub fn decide_block_reason(
        &self,
        arrival: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Option<DecideBlock> {
        let arrival = match arrival {
            Some(at) => at,
            None => return Some(DecideBlock::NotArrivalDay),
        };
        if arrival.date() != now.date() {
            return Some(DecideBlock::NotArrivalDay);
        }
        if now.time() < self.open {
            return Some(DecideBlock::BeforeOpening);
        }
        None
    }

    /// Instant after which a confirmed reservation counts as a no-show.
    pub fn expires_at(&self, arrival: NaiveDateTime) -> NaiveDateTime {
        arrival + self.grace
    }

    pub fn can_mark_no_show(
        &self,
        status: &str,
        expires_at: Option<NaiveDateTime>,
        checked_in_at: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> bool {
        status == STATUS_CONFIRMED
            && checked_in_at.is_none()
            && expires_at.map(|at| now > at).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalRejection {
    DayOutOfRange,
    BeforeOpening,
    AfterClosing,
    TooSoon,
}

impl fmt::Display for ArrivalRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ArrivalRejection::DayOutOfRange => "Reservations are only accepted for today or tomorrow.",
            ArrivalRejection::BeforeOpening => "That time is before opening.",
            ArrivalRejection::AfterClosing => "That time is after closing.",
            ArrivalRejection::TooSoon => "The arrival time must be a little further ahead.",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelBlock {
    WrongStatus,
    TooCloseToArrival,
}

impl fmt::Display for CancelBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            CancelBlock::WrongStatus => "This reservation can no longer be canceled in its current status.",
            CancelBlock::TooCloseToArrival => "Too close to the arrival time to cancel.",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecideBlock {
    NotArrivalDay,
    BeforeOpening,
}

impl fmt::Display for DecideBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DecideBlock::NotArrivalDay => "Allowed only on the reservation's arrival day.",
            DecideBlock::BeforeOpening => "Allowed only from opening time on the arrival day.",
        };
        f.write_str(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{STATUS_ARRIVED, STATUS_CANCELED, STATUS_NO_SHOW};

    fn policy() -> BookingPolicy {
        BookingPolicy::default()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_time(time(h, min))
    }

    // now = 2024-01-10 12:00 throughout, matching a midday booking.
    fn noon() -> NaiveDateTime {
        at(2024, 1, 10, 12, 0)
    }

    #[test]
    fn rejects_days_other_than_today_or_tomorrow() {
        let p = policy();
        for day in [
            date(2024, 1, 9),
            date(2024, 1, 12),
            date(2024, 2, 10),
            date(2023, 1, 10),
        ] {
            for t in [time(6, 0), time(10, 0), time(17, 0), time(23, 0)] {
                assert_eq!(
                    p.validate_arrival(day, t, noon()),
                    Err(ArrivalRejection::DayOutOfRange),
                    "day {day} time {t}"
                );
            }
        }
    }

    #[test]
    fn day_is_checked_before_time_of_day() {
        // Out-of-window time on an out-of-range day still reports the day.
        let p = policy();
        assert_eq!(
            p.validate_arrival(date(2024, 1, 12), time(3, 0), noon()),
            Err(ArrivalRejection::DayOutOfRange)
        );
    }

    #[test]
    fn today_respects_opening_and_closing() {
        let p = policy();
        let today = date(2024, 1, 10);
        assert_eq!(
            p.validate_arrival(today, time(6, 59), noon()),
            Err(ArrivalRejection::BeforeOpening)
        );
        assert_eq!(
            p.validate_arrival(today, time(17, 1), noon()),
            Err(ArrivalRejection::AfterClosing)
        );
        // Closing boundary is inclusive.
        assert_eq!(
            p.validate_arrival(today, time(17, 0), noon()),
            Ok(at(2024, 1, 10, 17, 0))
        );
    }

    #[test]
    fn tomorrow_ignores_the_lead_time() {
        let p = policy();
        let tomorrow = date(2024, 1, 11);
        // 07:00 tomorrow is far less than min_lead from "now" on the
        // clock face, but the lead rule only applies to today.
        assert_eq!(
            p.validate_arrival(tomorrow, time(7, 0), noon()),
            Ok(at(2024, 1, 11, 7, 0))
        );
        assert_eq!(
            p.validate_arrival(tomorrow, time(6, 59), noon()),
            Err(ArrivalRejection::BeforeOpening)
        );
        assert_eq!(
            p.validate_arrival(tomorrow, time(17, 0), noon()),
            Ok(at(2024, 1, 11, 17, 0))
        );
    }

    #[test]
    fn same_day_lead_time_boundary_is_inclusive() {
        let p = policy();
        let today = date(2024, 1, 10);
        assert_eq!(
            p.validate_arrival(today, time(12, 5), noon()),
            Err(ArrivalRejection::TooSoon)
        );
        assert_eq!(
            p.validate_arrival(today, time(12, 9), noon()),
            Err(ArrivalRejection::TooSoon)
        );
        // Exactly now + 10 min is accepted.
        assert_eq!(
            p.validate_arrival(today, time(12, 10), noon()),
            Ok(at(2024, 1, 10, 12, 10))
        );
        assert_eq!(
            p.validate_arrival(today, time(12, 15), noon()),
            Ok(at(2024, 1, 10, 12, 15))
        );
    }

    #[test]
    fn rejection_reasons_are_distinct() {
        let p = policy();
        let reasons = [
            p.validate_arrival(date(2024, 1, 12), time(10, 0), noon()),
            p.validate_arrival(date(2024, 1, 11), time(6, 59), noon()),
            p.validate_arrival(date(2024, 1, 11), time(17, 1), noon()),
            p.validate_arrival(date(2024, 1, 10), time(12, 5), noon()),
        ];
        let messages: Vec<String> = reasons
            .into_iter()
            .map(|r| r.unwrap_err().to_string())
            .collect();
        for (i, a) in messages.iter().enumerate() {
            for b in messages.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn validate_is_pure() {
        let p = policy();
        let first = p.validate_arrival(date(2024, 1, 10), time(12, 15), noon());
        let second = p.validate_arrival(date(2024, 1, 10), time(12, 15), noon());
        assert_eq!(first, second);
    }

    #[test]
    fn cancel_requires_pending_or_confirmed() {
        let p = policy();
        let far = Some(at(2024, 1, 10, 16, 0));
        assert!(p.can_cancel(STATUS_PENDING, far, noon()));
        assert!(p.can_cancel(STATUS_CONFIRMED, far, noon()));
        for status in [STATUS_ARRIVED, STATUS_NO_SHOW, STATUS_CANCELED] {
            assert!(!p.can_cancel(status, far, noon()), "status {status}");
            assert!(!p.can_cancel(status, None, noon()), "status {status}");
            assert_eq!(
                p.cancel_block_reason(status, far, noon()),
                Some(CancelBlock::WrongStatus)
            );
        }
    }

    #[test]
    fn cancel_cutoff_applies_only_with_an_arrival_instant() {
        let p = policy();
        assert!(p.can_cancel(STATUS_PENDING, None, noon()));

        // 5 minutes before arrival: inside the 10 minute cutoff.
        let soon = Some(at(2024, 1, 10, 12, 5));
        assert!(!p.can_cancel(STATUS_CONFIRMED, soon, noon()));
        assert_eq!(
            p.cancel_block_reason(STATUS_CONFIRMED, soon, noon()),
            Some(CancelBlock::TooCloseToArrival)
        );

        // Exactly at the cutoff is already too late (now == arrival - cutoff).
        let edge = Some(at(2024, 1, 10, 12, 10));
        assert!(!p.can_cancel(STATUS_CONFIRMED, edge, noon()));

        let clear = Some(at(2024, 1, 10, 12, 11));
        assert!(p.can_cancel(STATUS_CONFIRMED, clear, noon()));
    }

    #[test]
    fn can_cancel_is_pure() {
        let p = policy();
        let arrival = Some(at(2024, 1, 10, 12, 30));
        assert_eq!(
            p.can_cancel(STATUS_PENDING, arrival, noon()),
            p.can_cancel(STATUS_PENDING, arrival, noon())
        );
    }

    #[test]
    fn decisions_unlock_on_the_arrival_day_at_opening() {
        let p = policy();
        let today_arrival = Some(at(2024, 1, 10, 14, 0));
        let tomorrow_arrival = Some(at(2024, 1, 11, 9, 0));

        assert!(p.can_decide(today_arrival, noon()));
        assert_eq!(
            p.decide_block_reason(tomorrow_arrival, noon()),
            Some(DecideBlock::NotArrivalDay)
        );
        // Same day but before opening.
        assert_eq!(
            p.decide_block_reason(today_arrival, at(2024, 1, 10, 6, 30)),
            Some(DecideBlock::BeforeOpening)
        );
        // Opening minute itself is allowed.
        assert!(p.can_decide(today_arrival, at(2024, 1, 10, 7, 0)));
        assert_eq!(
            p.decide_block_reason(None, noon()),
            Some(DecideBlock::NotArrivalDay)
        );
    }

    #[test]
    fn no_show_needs_confirmed_expired_and_absent() {
        let p = policy();
        let expired = Some(at(2024, 1, 10, 11, 0));
        let pending_expiry = Some(at(2024, 1, 10, 13, 0));
        let checked_in = Some(at(2024, 1, 10, 10, 50));

        assert!(p.can_mark_no_show(STATUS_CONFIRMED, expired, None, noon()));
        assert!(!p.can_mark_no_show(STATUS_CONFIRMED, pending_expiry, None, noon()));
        assert!(!p.can_mark_no_show(STATUS_CONFIRMED, expired, checked_in, noon()));
        assert!(!p.can_mark_no_show(STATUS_CONFIRMED, None, None, noon()));
        assert!(!p.can_mark_no_show(STATUS_PENDING, expired, None, noon()));
    }

    #[test]
    fn expiry_adds_the_grace_period() {
        let p = policy();
        assert_eq!(
            p.expires_at(at(2024, 1, 10, 12, 30)),
            at(2024, 1, 10, 12, 50)
        );
    }

    #[test]
    fn instant_round_trip() {
        let instant = at(2024, 1, 10, 12, 15);
        assert_eq!(parse_instant(&format_instant(instant)), Some(instant));
        assert_eq!(parse_instant("not a time"), None);
    }
}
