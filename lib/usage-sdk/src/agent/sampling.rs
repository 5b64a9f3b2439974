use std::fmt::Display;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::recorder::RecorderError;

/// Share of executions to report, between 0 (never) and 1 (always).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate {
    value: f64,
}

impl SampleRate {
    pub const ALWAYS: SampleRate = SampleRate { value: 1.0 };

    pub fn new(value: f64) -> Result<Self, RecorderError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(RecorderError::InvalidSampleRate(value));
        }
        Ok(SampleRate { value })
    }

    pub fn as_f64(&self) -> f64 {
        self.value
    }

    /// One uniform draw against the rate.
    pub fn should_include(&self) -> bool {
        if self.value >= 1.0 {
            return true;
        }
        if self.value <= 0.0 {
            return false;
        }
        rand::rng().random_bool(self.value)
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl FromStr for SampleRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s_trimmed = s.trim();
        if let Some(number_part) = s_trimmed.strip_suffix('%') {
            let value: f64 = number_part.trim().parse().map_err(|err| {
                format!("Failed to parse percentage value '{}': {}", number_part, err)
            })?;
            SampleRate::new(value / 100.0).map_err(|err| err.to_string())
        } else {
            Err(format!(
                "Sample rate must be a percentage ending with '%', got: '{}'",
                s_trimmed
            ))
        }
    }
}

impl Display for SampleRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.value * 100.0)
    }
}

// `n%` string
impl<'de> Deserialize<'de> for SampleRate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SampleRate::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for SampleRate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::SampleRate;
    use crate::agent::recorder::RecorderError;

    #[test]
    fn rejects_rates_outside_unit_interval() {
        assert!(matches!(
            SampleRate::new(1.5),
            Err(RecorderError::InvalidSampleRate(value)) if value == 1.5
        ));
        assert!(SampleRate::new(-0.1).is_err());
        assert!(SampleRate::new(f64::NAN).is_err());
        assert!(SampleRate::new(0.0).is_ok());
        assert!(SampleRate::new(1.0).is_ok());
    }

    #[test]
    fn extreme_rates_are_deterministic() {
        let never = SampleRate::new(0.0).unwrap();
        let always = SampleRate::new(1.0).unwrap();

        for _ in 0..100 {
            assert!(!never.should_include());
            assert!(always.should_include());
        }
    }

    #[test]
    fn parses_percentages() {
        assert_eq!(SampleRate::from_str("50%").unwrap().as_f64(), 0.5);
        assert_eq!(SampleRate::from_str(" 100% ").unwrap().as_f64(), 1.0);
        assert!(SampleRate::from_str("0.5").is_err());
        assert!(SampleRate::from_str("150%").is_err());
        assert_eq!(SampleRate::new(0.25).unwrap().to_string(), "25%");
    }

    #[test]
    fn deserializes_from_percentage_string() {
        let rate: SampleRate = serde_json::from_str("\"10%\"").unwrap();
        assert_eq!(rate.as_f64(), 0.1);
        assert!(serde_json::from_str::<SampleRate>("\"abc\"").is_err());
    }
}
