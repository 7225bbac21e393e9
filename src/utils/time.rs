use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};

/// Calendar day of an event as the user would name it, i.e. in the host
/// timezone rather than UTC.
pub fn local_date_of(moment: DateTime<Utc>) -> NaiveDate {
    moment.with_timezone(&Local).date_naive()
}

/// Hour of day (0-23) of an event in the host timezone.
pub fn local_hour_of(moment: DateTime<Utc>) -> usize {
    moment.with_timezone(&Local).hour() as usize
}
