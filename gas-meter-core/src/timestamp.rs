use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime, PrimitiveDateTime,
    UtcOffset,
};

use crate::error::MeterError;

const WITH_OFFSET: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
);
const SECONDS: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const MINUTES: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Parse a reading timestamp.
///
/// Accepted forms, tried in order:
/// - `2025-01-12 14:50:00.000000+0000`
/// - `2025-01-12 14:50:00`
/// - `2025-01-12 14:50`
///
/// The two forms without an offset are taken to be in `local_offset`.
pub fn parse_reading_timestamp(input: &str, local_offset: UtcOffset) -> Result<OffsetDateTime, MeterError> {
    let input = input.trim();

    if let Ok(ts) = OffsetDateTime::parse(input, WITH_OFFSET) {
        return Ok(ts);
    }

    for format in [SECONDS, MINUTES] {
        if let Ok(naive) = PrimitiveDateTime::parse(input, format) {
            return Ok(naive.assume_offset(local_offset));
        }
    }

    Err(MeterError::Parse(format!("unrecognised timestamp '{input}'")))
}

/// Parse a meter value as sent by the host, e.g. `"123.456"`.
pub fn parse_reading_value(input: &str) -> Result<f64, MeterError> {
    input
        .trim()
        .parse::<f64>()
        .map_err(|e| MeterError::Parse(format!("invalid reading value '{input}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn parses_all_accepted_formats() {
        let utc = UtcOffset::UTC;
        assert_eq!(
            parse_reading_timestamp("2025-01-12 14:50:00.000000+0000", utc).unwrap(),
            datetime!(2025-01-12 14:50:00 UTC)
        );
        assert_eq!(
            parse_reading_timestamp("2025-01-12 14:50:00", utc).unwrap(),
            datetime!(2025-01-12 14:50:00 UTC)
        );
        assert_eq!(
            parse_reading_timestamp("2025-01-12 14:50", utc).unwrap(),
            datetime!(2025-01-12 14:50:00 UTC)
        );
    }

    #[test]
    fn keeps_explicit_offset_and_fraction() {
        let ts = parse_reading_timestamp("2025-01-12 14:50:00.250000+0100", UtcOffset::UTC).unwrap();
        assert_eq!(ts, datetime!(2025-01-12 13:50:00.25 UTC));
        assert_eq!(ts.offset(), offset!(+1));
    }

    #[test]
    fn naive_forms_use_local_offset() {
        let ts = parse_reading_timestamp("2025-01-12 14:50", offset!(+2)).unwrap();
        assert_eq!(ts, datetime!(2025-01-12 12:50:00 UTC));
    }

    #[test]
    fn rejects_unknown_formats() {
        for bad in ["2025/01/12", "", "2025-01-12", "2025-01-12T14:50:00Z", "yesterday"] {
            let res = parse_reading_timestamp(bad, UtcOffset::UTC);
            assert!(matches!(res, Err(MeterError::Parse(_))), "accepted {bad:?}");
        }
    }

    #[test]
    fn parses_reading_values() {
        assert_eq!(parse_reading_value(" 103.5 ").unwrap(), 103.5);
        assert!(matches!(parse_reading_value("12,5"), Err(MeterError::Parse(_))));
        assert!(matches!(parse_reading_value(""), Err(MeterError::Parse(_))));
    }
}
