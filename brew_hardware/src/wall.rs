//! Wall clock with a fixed UTC offset.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};

use brew_traits::WallClock;

/// Parse `"+01:00"`, `"-0530"`, `"+02"`, `"Z"` or `"UTC"` into an offset.
pub fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let tz = tz.trim();
    if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    if !rest.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }
    let (h, m) = match rest.split_once(':') {
        Some((h, m)) if h.len() == 2 && m.len() == 2 => (h, m),
        Some(_) => return None,
        None if rest.len() == 4 => (&rest[..2], &rest[2..]),
        None if rest.len() == 2 => (rest, "00"),
        None => return None,
    };
    let (h, m) = (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?);
    if h > 14 || m > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}

/// Local time at a fixed offset from UTC.
#[derive(Debug, Clone)]
pub struct FixedOffsetWallClock {
    offset: FixedOffset,
    now: fn() -> DateTime<Utc>,
}

impl Default for FixedOffsetWallClock {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
            now: Utc::now,
        }
    }
}

impl FixedOffsetWallClock {
    /// `None` if `tz` is not a recognised offset.
    pub fn new(tz: &str) -> Option<Self> {
        parse_offset(tz).map(|offset| Self {
            offset,
            ..Self::default()
        })
    }

    /// Replace the UTC source, e.g. with a fixed instant in tests.
    pub fn with_time_source(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local_now(&self) -> DateTime<FixedOffset> {
        (self.now)().with_timezone(&self.offset)
    }
}

impl WallClock for FixedOffsetWallClock {
    fn local_hour(&self) -> Option<u32> {
        Some(self.local_now().hour())
    }

    fn set_timezone(&mut self, tz: &str) -> bool {
        match parse_offset(tz) {
            Some(offset) => {
                tracing::info!(timezone = tz, "timezone applied");
                self.offset = offset;
                true
            }
            None => false,
        }
    }
}
