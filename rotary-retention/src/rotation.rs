//! One snapshot directory entry and its creation time.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::format::{parse as parse_items, Item, Numeric, Parsed, StrftimeItems};
use chrono::{NaiveDateTime, NaiveTime, ParseError};
use serde::Serialize;

/// A snapshot entry in the working directory.
///
/// Identity is the path alone: two rotations with the same path are equal
/// and hash alike whatever timestamp was parsed for them. Ordering is newest
/// first, ties broken by path.
#[derive(Debug, Clone, Serialize)]
pub struct Rotation {
    pub path: String,
    pub created: NaiveDateTime,
}

impl Rotation {
    pub fn new(path: impl Into<String>, created: NaiveDateTime) -> Self {
        Self {
            path: path.into(),
            created,
        }
    }

    /// Parse `name` against the strftime-style `format`.
    ///
    /// Date-only formats such as `%Y%m%d` yield midnight. Formats with an
    /// hour but no minute or second (`%Y%m%d%H`) default those to zero.
    pub fn parse(name: &str, format: &str) -> Result<Self, ParseError> {
        let mut parsed = Parsed::new();
        parse_items(&mut parsed, name, StrftimeItems::new(format))?;
        let created = match time_fields(format) {
            TimeFields::None => parsed.to_naive_date()?.and_time(NaiveTime::default()),
            TimeFields::Timestamp => parsed.to_naive_datetime_with_offset(0)?,
            TimeFields::Clock => {
                // Fails only when the field already holds another value.
                let _ = parsed.set_minute(0);
                let _ = parsed.set_second(0);
                parsed.to_naive_datetime_with_offset(0)?
            }
        };
        Ok(Self::new(name, created))
    }
}

enum TimeFields {
    None,
    Clock,
    Timestamp,
}

fn time_fields(format: &str) -> TimeFields {
    let mut fields = TimeFields::None;
    for item in StrftimeItems::new(format) {
        match item {
            Item::Numeric(Numeric::Timestamp, _) => return TimeFields::Timestamp,
            Item::Numeric(
                Numeric::Hour | Numeric::Hour12 | Numeric::Minute | Numeric::Second | Numeric::Nanosecond,
                _,
            ) => fields = TimeFields::Clock,
            _ => {}
        }
    }
    fields
}

impl PartialEq for Rotation {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Rotation {}

impl Hash for Rotation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

// Consistent with `Eq` only while no two rotations share a path with
// different timestamps; the engine keeps rotations in sets keyed by path.
impl Ord for Rotation {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.path == other.path {
            return Ordering::Equal;
        }
        other
            .created
            .cmp(&self.created)
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for Rotation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)
    }
}
