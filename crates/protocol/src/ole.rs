//! OLE Automation dates: fractional day counts since 1899-12-30.
//!
//! Negative values keep their integer part as the day offset and count the
//! fractional part forward from that day's midnight, so `-1.25` is
//! 1899-12-29 06:00.

use crate::ProtocolError;
use chrono::{Duration, NaiveDate, NaiveDateTime};

const MILLIS_PER_DAY: i64 = 86_400_000;
/// Exclusive bounds accepted by the platform (years 0100 and 9999).
const MIN_OA_DATE: f64 = -657_435.0;
const MAX_OA_DATE: f64 = 2_958_466.0;

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert an OLE date to a timestamp, rounding to the nearest millisecond.
pub fn from_oa_date(value: f64) -> Result<NaiveDateTime, ProtocolError> {
    if !(value > MIN_OA_DATE && value < MAX_OA_DATE) {
        return Err(ProtocolError::OleDateOutOfRange(value));
    }
    let mut millis = (value * MILLIS_PER_DAY as f64 + if value >= 0.0 { 0.5 } else { -0.5 }) as i64;
    if millis < 0 {
        millis -= (millis % MILLIS_PER_DAY) * 2;
    }
    Ok(epoch() + Duration::milliseconds(millis))
}

/// Convert a timestamp to an OLE date at millisecond precision.
pub fn to_oa_date(timestamp: NaiveDateTime) -> f64 {
    let mut millis = (timestamp - epoch()).num_milliseconds();
    if millis < 0 {
        let frac = millis % MILLIS_PER_DAY;
        if frac != 0 {
            millis -= (MILLIS_PER_DAY + frac) * 2;
        }
    }
    millis as f64 / MILLIS_PER_DAY as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_epoch_and_whole_days() {
        assert_eq!(from_oa_date(0.0).unwrap(), at(1899, 12, 30, 0, 0));
        assert_eq!(from_oa_date(2.0).unwrap(), at(1900, 1, 1, 0, 0));
        assert_eq!(from_oa_date(45658.0).unwrap(), at(2025, 1, 1, 0, 0));
    }

    #[test]
    fn test_fractional_days() {
        assert_eq!(from_oa_date(45658.5).unwrap(), at(2025, 1, 1, 12, 0));
        assert_eq!(to_oa_date(at(2025, 1, 1, 18, 0)), 45658.75);
    }

    #[test]
    fn test_negative_dates_count_forward_within_day() {
        assert_eq!(from_oa_date(-1.25).unwrap(), at(1899, 12, 29, 6, 0));
        assert_eq!(to_oa_date(at(1899, 12, 29, 6, 0)), -1.25);
    }

    #[test]
    fn test_out_of_range() {
        assert!(from_oa_date(3_000_000.0).is_err());
        assert!(from_oa_date(-700_000.0).is_err());
        assert!(from_oa_date(f64::NAN).is_err());
    }

    #[test]
    fn test_out_of_range_message_stays_short() {
        let err = from_oa_date(1e300).unwrap_err();
        assert_eq!(err.to_string(), "OLE date 1e300 is out of range");
    }

    #[test]
    fn test_minute_timestamps_survive_conversion() {
        let ts = at(2025, 11, 14, 15, 45);
        assert_eq!(from_oa_date(to_oa_date(ts)).unwrap(), ts);
    }
}
