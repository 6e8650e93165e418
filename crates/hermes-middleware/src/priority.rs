//! Middleware execution priorities.
//!
//! Priorities are plain 32-bit signed integers; lower values execute first.
//! The band schema is a convention, not an enum: any integer is a valid
//! priority, and the named constants simply mark the conventional bands.
//!
//! | Range | Band |
//! |---|---|
//! | 0–99 | Pre-processing |
//! | 100–299 | Security (authentication) |
//! | 300–399 | Validation & sanitization |
//! | 400–499 | Traffic control |
//! | 500–599 | Observability |
//! | 600–699 | Enhancement |
//! | 700–799 | Error handling |
//! | 800–899 | Post-processing |
//! | 900–999 | Transactions |
//! | ≥1000 | Custom |

use serde::{Deserialize, Serialize};

/// A middleware execution priority. Lower values execute first.
///
/// # Example
///
/// ```
/// use hermes_middleware::Priority;
///
/// let custom = Priority::between(Priority::AUTHENTICATION, Priority::VALIDATION);
/// assert!(Priority::AUTHENTICATION < custom);
/// assert!(custom < Priority::VALIDATION);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Priority(i32);

impl Priority {
    /// Pre-processing band start.
    pub const PRE_PROCESSING: Self = Self(0);
    /// Security band start (authentication and friends).
    pub const AUTHENTICATION: Self = Self(100);
    /// Validation & sanitization band start.
    pub const VALIDATION: Self = Self(300);
    /// Traffic control band start (rate limiting, back-pressure).
    pub const TRAFFIC_CONTROL: Self = Self(400);
    /// Observability band start.
    pub const OBSERVABILITY: Self = Self(500);
    /// Enhancement band start (caching, compression, encryption).
    pub const ENHANCEMENT: Self = Self(600);
    /// Error handling band start.
    pub const ERROR_HANDLING: Self = Self(700);
    /// Post-processing band start.
    pub const POST_PROCESSING: Self = Self(800);
    /// Transaction band start.
    pub const TRANSACTION: Self = Self(900);
    /// Custom band start.
    pub const CUSTOM: Self = Self(1000);

    /// Creates a priority from a raw integer.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Returns a priority that executes immediately before this one.
    #[must_use]
    pub const fn before(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Returns a priority that executes immediately after this one.
    #[must_use]
    pub const fn after(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the priority midway between two priorities.
    #[must_use]
    pub const fn between(a: Self, b: Self) -> Self {
        // i64 arithmetic avoids overflow at the i32 extremes.
        Self(((a.0 as i64 + b.0 as i64) / 2) as i32)
    }

    /// Returns the conventional band this priority falls into.
    #[must_use]
    pub const fn band(self) -> PriorityBand {
        match self.0 {
            i32::MIN..=99 => PriorityBand::PreProcessing,
            100..=299 => PriorityBand::Security,
            300..=399 => PriorityBand::Validation,
            400..=499 => PriorityBand::TrafficControl,
            500..=599 => PriorityBand::Observability,
            600..=699 => PriorityBand::Enhancement,
            700..=799 => PriorityBand::ErrorHandling,
            800..=899 => PriorityBand::PostProcessing,
            900..=999 => PriorityBand::Transaction,
            _ => PriorityBand::Custom,
        }
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The conventional priority bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityBand {
    /// 0–99: request shaping before any policy runs.
    PreProcessing,
    /// 100–299: authentication and credential handling.
    Security,
    /// 300–399: validation and sanitization.
    Validation,
    /// 400–499: rate limiting and admission control.
    TrafficControl,
    /// 500–599: logging, tracing, metrics.
    Observability,
    /// 600–699: caching, compression, encryption.
    Enhancement,
    /// 700–799: error translation and recovery.
    ErrorHandling,
    /// 800–899: result shaping after the handler.
    PostProcessing,
    /// 900–999: transactional boundaries.
    Transaction,
    /// ≥1000: application-defined stages.
    Custom,
}

impl PriorityBand {
    /// Returns the band name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PreProcessing => "pre_processing",
            Self::Security => "security",
            Self::Validation => "validation",
            Self::TrafficControl => "traffic_control",
            Self::Observability => "observability",
            Self::Enhancement => "enhancement",
            Self::ErrorHandling => "error_handling",
            Self::PostProcessing => "post_processing",
            Self::Transaction => "transaction",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for PriorityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_band_ordering() {
        assert!(Priority::PRE_PROCESSING < Priority::AUTHENTICATION);
        assert!(Priority::AUTHENTICATION < Priority::VALIDATION);
        assert!(Priority::VALIDATION < Priority::TRAFFIC_CONTROL);
        assert!(Priority::TRAFFIC_CONTROL < Priority::OBSERVABILITY);
        assert!(Priority::OBSERVABILITY < Priority::ENHANCEMENT);
        assert!(Priority::ENHANCEMENT < Priority::ERROR_HANDLING);
        assert!(Priority::ERROR_HANDLING < Priority::POST_PROCESSING);
        assert!(Priority::POST_PROCESSING < Priority::TRANSACTION);
        assert!(Priority::TRANSACTION < Priority::CUSTOM);
    }

    #[test]
    fn test_before_after() {
        assert_eq!(Priority::AUTHENTICATION.before().value(), 99);
        assert_eq!(Priority::AUTHENTICATION.after().value(), 101);
        // Saturation at the extremes.
        assert_eq!(Priority::new(i32::MIN).before().value(), i32::MIN);
        assert_eq!(Priority::new(i32::MAX).after().value(), i32::MAX);
    }

    #[test]
    fn test_band_classification() {
        assert_eq!(Priority::new(-5).band(), PriorityBand::PreProcessing);
        assert_eq!(Priority::new(150).band(), PriorityBand::Security);
        assert_eq!(Priority::new(450).band(), PriorityBand::TrafficControl);
        assert_eq!(Priority::new(999).band(), PriorityBand::Transaction);
        assert_eq!(Priority::new(5000).band(), PriorityBand::Custom);
    }

    proptest! {
        #[test]
        fn prop_between_is_bounded(a in i32::MIN..i32::MAX, b in i32::MIN..i32::MAX) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let mid = Priority::between(Priority::new(a), Priority::new(b)).value();
            prop_assert!(lo <= mid && mid <= hi);
        }
    }
}
