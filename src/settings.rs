//! User preferences stored in the `settings` store

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightUnit::Kg => f.write_str("kg"),
            WeightUnit::Lb => f.write_str("lb"),
        }
    }
}

impl FromStr for WeightUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kg" | "kgs" | "kilograms" => Ok(WeightUnit::Kg),
            "lb" | "lbs" | "pounds" => Ok(WeightUnit::Lb),
            other => Err(format!("unknown weight unit: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Default rest between sets for newly added exercises, seconds
    pub rest_between_sets: u32,
    /// Default rest after an exercise, seconds
    pub rest_after_exercise: u32,
    pub weight_unit: WeightUnit,
    /// Timed sets complete on their own when the countdown hits zero
    pub auto_complete_timed_sets: bool,
    /// Seconds before the end of a rest to emit a warning
    pub countdown_warning_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rest_between_sets: 60,
            rest_after_exercise: 90,
            weight_unit: WeightUnit::Kg,
            auto_complete_timed_sets: true,
            countdown_warning_secs: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let s: Settings = serde_json::from_str(r#"{"weightUnit":"lb"}"#).unwrap();
        assert_eq!(s.weight_unit, WeightUnit::Lb);
        assert_eq!(s.rest_between_sets, 60);
        assert!(s.auto_complete_timed_sets);
    }

    #[test]
    fn test_weight_unit_parse() {
        assert_eq!("LBS".parse::<WeightUnit>(), Ok(WeightUnit::Lb));
        assert!("stone".parse::<WeightUnit>().is_err());
    }
}
