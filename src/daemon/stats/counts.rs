use chrono::{DateTime, Duration, Utc};

use super::log::KeystrokeLog;

/// Counts over the trailing windows the UI surfaces. Derived state: always
/// recomputable from the log, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub last_minute: usize,
    pub last_hour: usize,
    pub last_day: usize,
    pub total: usize,
}

impl WindowCounts {
    pub fn compute(log: &KeystrokeLog, now: DateTime<Utc>) -> Self {
        Self {
            last_minute: log.count_since(now - Duration::seconds(60)),
            last_hour: log.count_since(now - Duration::seconds(3600)),
            last_day: log.count_since(now - Duration::seconds(86400)),
            total: log.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::*;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    #[test]
    fn windows_count_from_their_cutoffs() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let mut log = KeystrokeLog::new();
        log.append(start);
        log.append(start + Duration::seconds(30));
        log.append(start + Duration::seconds(90));

        let counts = WindowCounts::compute(&log, start + Duration::seconds(100));
        assert_eq!(
            counts,
            WindowCounts {
                last_minute: 1,
                last_hour: 3,
                last_day: 3,
                total: 3,
            }
        );
    }

    #[test]
    fn empty_log_yields_zeroes() {
        let now = Utc.from_utc_datetime(&TEST_START_DATE);
        assert_eq!(
            WindowCounts::compute(&KeystrokeLog::new(), now),
            WindowCounts::default()
        );
    }

    #[test]
    fn backwards_clock_does_not_panic() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let mut log = KeystrokeLog::new();
        log.append(start);

        // "now" before the recorded event: the event is simply outside no
        // window, i.e. inside all of them.
        let counts = WindowCounts::compute(&log, start - Duration::hours(1));
        assert_eq!(counts.last_minute, 1);
        assert_eq!(counts.total, 1);
    }
}
