//! Storage-boundary encodings for weekdays and times of day.
//!
//! Stored weekday lists are comma-separated digit tokens: `1`..`6` for
//! Monday..Saturday. Sunday appears as either `0` or the legacy sentinel `7`
//! depending on which writer produced the row; both decode to the same
//! [`Weekday::Sun`]. Encoding always writes `0`.

use chrono::Weekday;

use crate::engine::EngineError;
use crate::model::{TimeOfDay, WeekdaySet};

pub const SUNDAY_TOKEN: &str = "0";
pub const LEGACY_SUNDAY_TOKEN: &str = "7";

pub fn decode_weekday_token(token: &str) -> Result<Weekday, EngineError> {
    match token.trim() {
        SUNDAY_TOKEN | LEGACY_SUNDAY_TOKEN => Ok(Weekday::Sun),
        "1" => Ok(Weekday::Mon),
        "2" => Ok(Weekday::Tue),
        "3" => Ok(Weekday::Wed),
        "4" => Ok(Weekday::Thu),
        "5" => Ok(Weekday::Fri),
        "6" => Ok(Weekday::Sat),
        other => Err(EngineError::InvalidWeekdayToken(other.to_string())),
    }
}

pub fn encode_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "1",
        Weekday::Tue => "2",
        Weekday::Wed => "3",
        Weekday::Thu => "4",
        Weekday::Fri => "5",
        Weekday::Sat => "6",
        Weekday::Sun => SUNDAY_TOKEN,
    }
}

/// Empty tokens are ignored, so `""` and `"1,,3"` are accepted.
pub fn decode_weekdays(encoded: &str) -> Result<WeekdaySet, EngineError> {
    let mut set = WeekdaySet::EMPTY;
    for token in encoded.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        set.insert(decode_weekday_token(token)?);
    }
    Ok(set)
}

/// Monday first, Sunday last.
pub fn encode_weekdays(set: WeekdaySet) -> String {
    set.iter().map(encode_weekday).collect::<Vec<_>>().join(",")
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Result<TimeOfDay, EngineError> {
    let invalid = || EngineError::InvalidTime(s.to_string());
    let mut parts = s.trim().split(':');
    let mut field = |required: bool| -> Result<u32, EngineError> {
        match parts.next() {
            Some(p) if !p.is_empty() && p.len() <= 2 && p.bytes().all(|b| b.is_ascii_digit()) => {
                p.parse().map_err(|_| invalid())
            }
            None if !required => Ok(0),
            _ => Err(invalid()),
        }
    };
    let hour = field(true)?;
    let minute = field(true)?;
    let second = field(false)?;
    if parts.next().is_some() {
        return Err(invalid());
    }
    TimeOfDay::from_hms(hour, minute, second).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sunday_tokens_canonicalize() {
        let zero = decode_weekdays("0,3").unwrap();
        let seven = decode_weekdays("3,7").unwrap();
        assert_eq!(zero, seven);
        assert!(zero.contains(Weekday::Sun));
        assert_eq!(encode_weekdays(seven), "3,0");
    }

    #[test]
    fn sunday_written_by_either_convention_collides() {
        let a = decode_weekdays("7").unwrap();
        let b = decode_weekdays("0").unwrap();
        assert!(a.intersects(b));
    }

    #[test]
    fn decode_tolerates_whitespace_empty_and_duplicates() {
        let set = decode_weekdays(" 1, 1 ,,5 ").unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(Weekday::Mon));
        assert!(set.contains(Weekday::Fri));
        assert!(decode_weekdays("").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_unknown_tokens() {
        assert!(matches!(
            decode_weekdays("1,8"),
            Err(EngineError::InvalidWeekdayToken(t)) if t == "8"
        ));
        assert!(decode_weekdays("mon").is_err());
    }

    #[test]
    fn encode_full_week() {
        assert_eq!(encode_weekdays(WeekdaySet::ALL), "1,2,3,4,5,6,0");
        assert_eq!(decode_weekdays(&encode_weekdays(WeekdaySet::ALL)).unwrap(), WeekdaySet::ALL);
    }

    #[test]
    fn parse_times() {
        assert_eq!(parse_time_of_day("08:30").unwrap(), TimeOfDay::from_hms(8, 30, 0).unwrap());
        assert_eq!(parse_time_of_day("9:05:07").unwrap(), TimeOfDay::from_hms(9, 5, 7).unwrap());
        assert_eq!(parse_time_of_day("00:00").unwrap(), TimeOfDay::MIDNIGHT);
        for bad in ["24:00", "12", "12:60", "12:00:00:00", "ab:cd", "", "-1:00", "123:00"] {
            assert!(parse_time_of_day(bad).is_err(), "{bad} should be rejected");
        }
    }
}
