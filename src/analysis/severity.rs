use anyhow::{anyhow, Result};
use std::fmt;

/// Peak-count policy boundaries.
///
/// `peak <= low` is OPTIMAL, `peak >= high` is CRITICAL, anything between is ROUTINE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeverityThresholds {
    pub low: u32,
    pub high: u32,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self { low: 0, high: 5 }
    }
}

impl SeverityThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.low >= self.high {
            return Err(anyhow!(
                "severity thresholds must satisfy low < high (got low={}, high={})",
                self.low,
                self.high
            ));
        }
        Ok(())
    }
}

/// Road condition derived from the session's peak detection count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeverityStatus {
    Optimal,
    Routine,
    Critical,
}

impl SeverityStatus {
    /// Pure function of the peak count.
    pub fn classify(peak_count: u32, thresholds: &SeverityThresholds) -> Self {
        if peak_count >= thresholds.high {
            SeverityStatus::Critical
        } else if peak_count > thresholds.low {
            SeverityStatus::Routine
        } else {
            SeverityStatus::Optimal
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            SeverityStatus::Optimal => "OPTIMAL CONDITIONS",
            SeverityStatus::Routine => "ROUTINE MAINTENANCE",
            SeverityStatus::Critical => "IMMEDIATE INTERVENTION",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            SeverityStatus::Optimal => "No significant anomalies detected.",
            SeverityStatus::Routine => {
                "Surface degradation detected. Schedule maintenance within 48 hours."
            }
            SeverityStatus::Critical => {
                "Severe cluster detected. Road closure may be required."
            }
        }
    }
}

impl fmt::Display for SeverityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SeverityStatus::Optimal => "OPTIMAL",
            SeverityStatus::Routine => "ROUTINE",
            SeverityStatus::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_boundaries() {
        let t = SeverityThresholds::default();
        assert_eq!(SeverityStatus::classify(0, &t), SeverityStatus::Optimal);
        assert_eq!(SeverityStatus::classify(1, &t), SeverityStatus::Routine);
        assert_eq!(SeverityStatus::classify(3, &t), SeverityStatus::Routine);
        assert_eq!(SeverityStatus::classify(4, &t), SeverityStatus::Routine);
        assert_eq!(SeverityStatus::classify(5, &t), SeverityStatus::Critical);
        assert_eq!(SeverityStatus::classify(12, &t), SeverityStatus::Critical);
    }

    #[test]
    fn custom_policy() {
        let t = SeverityThresholds { low: 2, high: 10 };
        assert_eq!(SeverityStatus::classify(2, &t), SeverityStatus::Optimal);
        assert_eq!(SeverityStatus::classify(3, &t), SeverityStatus::Routine);
        assert_eq!(SeverityStatus::classify(10, &t), SeverityStatus::Critical);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        assert!(SeverityThresholds { low: 5, high: 5 }.validate().is_err());
        assert!(SeverityThresholds::default().validate().is_ok());
    }

    #[test]
    fn display_labels() {
        assert_eq!(SeverityStatus::Critical.to_string(), "CRITICAL");
        assert_eq!(SeverityStatus::Optimal.headline(), "OPTIMAL CONDITIONS");
    }
}
