//! Date-only values with optional components
//!
//! Accepted forms: `YYYY-MM-DD`, `YYYY-MM`, `MM-DD`, `YYYY`. A zero
//! component means the component is absent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MensagoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl MDate {
    pub fn new(year: u16, month: u8, day: u8) -> Result<Self> {
        let date = Self { year, month, day };
        date.validate()?;
        Ok(date)
    }

    fn validate(&self) -> Result<()> {
        if self.month > 12 {
            return Err(MensagoError::BadValue(format!("bad month {}", self.month)));
        }
        if self.day > 31 {
            return Err(MensagoError::BadValue(format!("bad day {}", self.day)));
        }
        if self.year == 0 && self.month == 0 {
            return Err(MensagoError::BadValue("date has no year or month".to_string()));
        }
        if self.month == 0 && self.day != 0 {
            return Err(MensagoError::BadValue("day given without a month".to_string()));
        }
        Ok(())
    }
}

fn parse_component<T: FromStr>(s: &str, width: usize) -> Result<T> {
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MensagoError::BadValue(format!("bad date component '{}'", s)));
    }
    s.parse()
        .map_err(|_| MensagoError::BadValue(format!("bad date component '{}'", s)))
}

impl FromStr for MDate {
    type Err = MensagoError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        let date = match parts.as_slice() {
            [year, month, day] => Self {
                year: parse_component(year, 4)?,
                month: parse_component(month, 2)?,
                day: parse_component(day, 2)?,
            },
            [first, second] if first.len() == 4 => Self {
                year: parse_component(first, 4)?,
                month: parse_component(second, 2)?,
                day: 0,
            },
            [month, day] => Self {
                year: 0,
                month: parse_component(month, 2)?,
                day: parse_component(day, 2)?,
            },
            [year] => Self {
                year: parse_component(year, 4)?,
                month: 0,
                day: 0,
            },
            _ => return Err(MensagoError::BadValue(format!("bad date '{}'", s))),
        };
        date.validate()?;
        Ok(date)
    }
}

impl fmt::Display for MDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.year, self.month, self.day) {
            (0, m, d) => write!(f, "{:02}-{:02}", m, d),
            (y, 0, _) => write!(f, "{:04}", y),
            (y, m, 0) => write!(f, "{:04}-{:02}", y, m),
            (y, m, d) => write!(f, "{:04}-{:02}-{:02}", y, m, d),
        }
    }
}

impl TryFrom<String> for MDate {
    type Error = MensagoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MDate> for String {
    fn from(value: MDate) -> Self {
        value.to_string()
    }
}
