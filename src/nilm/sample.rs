//! Aggregate power readings and their validation.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// One aggregate reading from the household meter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    /// Reading time in the meter's local offset.
    pub timestamp: DateTime<FixedOffset>,
    /// Aggregate power (W).
    pub watts: f64,
}

impl PowerSample {
    pub fn new(timestamp: DateTime<FixedOffset>, watts: f64) -> Self {
        Self { timestamp, watts }
    }

    /// Coerces a textual reading (e.g. a meter attribute or CSV cell).
    ///
    /// # Errors
    ///
    /// Returns `InputError` for text that is not a finite, non-negative
    /// decimal number.
    pub fn parse(raw: &str, timestamp: DateTime<FixedOffset>) -> Result<Self, InputError> {
        let watts = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| InputError::NotNumeric {
                raw: raw.to_string(),
            })?;
        let sample = Self::new(timestamp, watts);
        sample.validate()?;
        Ok(sample)
    }

    /// Checks that `watts` is finite and non-negative.
    ///
    /// # Errors
    ///
    /// `NotFinite` for NaN or infinities, `Negative` below zero.
    pub fn validate(&self) -> Result<(), InputError> {
        if !self.watts.is_finite() {
            return Err(InputError::NotFinite { watts: self.watts });
        }
        if self.watts < 0.0 {
            return Err(InputError::Negative { watts: self.watts });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn parses_trimmed_decimal_text() {
        let s = PowerSample::parse("  123.5\n", ts()).unwrap();
        assert_eq!(s.watts, 123.5);
        assert_eq!(PowerSample::parse("0", ts()).unwrap().watts, 0.0);
    }

    #[test]
    fn rejects_non_numeric_text() {
        for raw in ["", "abc", "12 W", "unavailable"] {
            assert!(matches!(
                PowerSample::parse(raw, ts()),
                Err(InputError::NotNumeric { .. })
            ));
        }
    }

    #[test]
    fn rejects_non_finite_and_negative() {
        assert!(matches!(
            PowerSample::parse("NaN", ts()),
            Err(InputError::NotFinite { .. })
        ));
        assert!(matches!(
            PowerSample::parse("inf", ts()),
            Err(InputError::NotFinite { .. })
        ));
        assert_eq!(
            PowerSample::new(ts(), -3.0).validate(),
            Err(InputError::Negative { watts: -3.0 })
        );
    }
}
