//! Numeric cell rendering: plain decimals and Excel serial dates.
//!
//! A numeric cell carries only an `f64`; whether it displays as a date is a
//! property of its number format. Formats are identified by numeric ids; the
//! set of ids treated as date/time formats is the fixed built-in set the
//! source readers used, which also covers a band of well-known custom ids.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::common::error::{Error, Result, TableKind};

/// Timestamp pattern for date-formatted cells, `yyyy-MM-dd HH:mm:ss.SSSZ` in
/// the source system's notation.
const DATE_RENDER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f%z";

/// Serial values at or beyond year 10000 are not treated as dates.
const MAX_EXCEL_SERIAL: f64 = 2_958_466.0;

/// Format ids that display as date or time.
pub fn is_date_format_id(id: u16) -> bool {
    matches!(id,
        0x0E..=0x16 // m/d/yy .. m/d/yy h:mm
        | 0x2D..=0x2F // mm:ss, [h]:mm:ss, mm:ss.0
        | 0xA5 | 0xA7 | 0xA9 // locale date variants
        | 0xAC..=0xAF // mm:dd:yy .. m:d:yy
    )
}

/// Whether a raw value is a plausible date serial.
pub fn is_valid_serial(value: f64) -> bool {
    value.is_finite() && value >= 0.0 && value < MAX_EXCEL_SERIAL
}

/// Convert an Excel serial date to a naive datetime.
///
/// The 1900 epoch counts from 1899-12-30 (absorbing the fictitious leap day);
/// the 1904 epoch counts from 1904-01-01.
pub fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !is_valid_serial(serial) {
        return None;
    }
    let base = if is_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let days = serial.trunc() as i64;
    let millis = (serial.fract() * 86_400_000.0).round() as i64;
    let date = base.checked_add_signed(Duration::days(days))?;
    Some(date.and_time(NaiveTime::MIN) + Duration::milliseconds(millis))
}

/// Render a date-formatted numeric cell as a fixed-format UTC timestamp.
/// Returns `None` when the value is not a valid serial, in which case the
/// caller falls back to plain numeric rendering.
pub fn render_date(serial: f64, is_1904: bool) -> Option<String> {
    let naive = serial_to_datetime(serial, is_1904)?;
    let utc: DateTime<Utc> = DateTime::from_naive_utc_and_offset(naive, Utc);
    Some(utc.format(DATE_RENDER_FORMAT).to_string())
}

/// Render a numeric cell as a plain decimal. Always keeps a fractional part
/// (`15.0`, not `15`), matching the source readers' output.
pub fn render_number(value: f64) -> String {
    let mut buf = ryu::Buffer::new();
    buf.format(value).to_string()
}

/// Immutable map from style index to number-format id, built once per
/// document from the container's style definitions.
#[derive(Debug, Default)]
pub struct StyleTable {
    format_ids: Vec<u16>,
}

impl StyleTable {
    pub fn new(format_ids: Vec<u16>) -> Self {
        Self { format_ids }
    }

    pub fn is_empty(&self) -> bool {
        self.format_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.format_ids.len()
    }

    /// Whether the style at `index` maps to a date/time format. Out-of-range
    /// indices are a resolution fault.
    pub fn is_date(&self, index: usize) -> Result<bool> {
        match self.format_ids.get(index) {
            Some(&id) => Ok(is_date_format_id(id)),
            None => Err(Error::Resolution {
                kind: TableKind::Style,
                index,
                len: self.format_ids.len(),
            }),
        }
    }

    /// Lenient variant for the legacy path: unknown style ids fall back to
    /// plain numeric rendering instead of faulting.
    pub fn is_date_or_plain(&self, index: usize) -> bool {
        self.format_ids
            .get(index)
            .map(|&id| is_date_format_id(id))
            .unwrap_or(false)
    }
}
