//! Next-run computation for [`JobSchedule`].

use super::job::JobSchedule;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

impl JobSchedule {
    /// First trigger time strictly after `now`. Daily schedules use the local
    /// time zone.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            JobSchedule::Interval(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|interval| now.checked_add_signed(interval))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            JobSchedule::DailyAt(at) => next_daily_run(&Local, now, *at),
        }
    }
}

/// Next instant after `now` at which the wall clock in `tz` reads `at`.
pub(crate) fn next_daily_run<Tz: TimeZone>(
    tz: &Tz,
    now: DateTime<Utc>,
    at: NaiveTime,
) -> DateTime<Utc> {
    let today = now.with_timezone(tz).date_naive();
    (0..=2u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|date| local_to_utc(tz, date.and_time(at)))
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| now + chrono::Duration::days(1))
}

/// Resolves a wall-clock time in `tz`: the first occurrence when ambiguous,
/// one hour later when it falls in a DST gap.
pub(crate) fn local_to_utc<Tz: TimeZone>(
    tz: &Tz,
    naive: NaiveDateTime,
) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

/// `[start, end)` of a calendar day in `tz`, as UTC instants.
pub(crate) fn local_day_bounds<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_to_utc(tz, date.and_hms_opt(0, 0, 0)?)?;
    let end = local_to_utc(tz, date.succ_opt()?.and_hms_opt(0, 0, 0)?)?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use std::time::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_interval_next_run() {
        let now = utc("2024-03-01T10:00:00Z");
        let schedule = JobSchedule::Interval(Duration::from_secs(30 * 60));
        assert_eq!(schedule.next_run_after(now), utc("2024-03-01T10:30:00Z"));
    }

    #[test]
    fn test_daily_later_today() {
        let next = next_daily_run(&Utc, utc("2024-03-01T01:30:00Z"), hm(2, 0));
        assert_eq!(next, utc("2024-03-01T02:00:00Z"));
    }

    #[test]
    fn test_daily_rolls_over_to_tomorrow() {
        let next = next_daily_run(&Utc, utc("2024-03-01T02:00:00Z"), hm(2, 0));
        assert_eq!(next, utc("2024-03-02T02:00:00Z"));

        let next = next_daily_run(&Utc, utc("2024-12-31T23:59:59Z"), hm(0, 0));
        assert_eq!(next, utc("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn test_daily_uses_local_offset() {
        // 22:30 UTC is already 00:30 on the next day at UTC+2
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let next = next_daily_run(&tz, utc("2024-03-01T22:30:00Z"), hm(0, 0));
        assert_eq!(next, utc("2024-03-02T22:00:00Z"));

        let next = next_daily_run(&tz, utc("2024-03-01T21:30:00Z"), hm(0, 0));
        assert_eq!(next, utc("2024-03-01T22:00:00Z"));
    }

    #[test]
    fn test_local_day_bounds() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let (start, end) = local_day_bounds(&tz, date).unwrap();
        assert_eq!(start, utc("2024-02-29T05:00:00Z"));
        assert_eq!(end, utc("2024-03-01T05:00:00Z"));
    }
}
