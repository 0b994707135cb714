//! # Credit Limit Policy
//!
//! Maps an externally supplied risk score to a credit limit. The vault
//! treats the mapping as an injected pure function: any `Fn(u32) -> u64`
//! is a [`LimitPolicy`], and [`RiskBandPolicy`] is the configurable
//! default.
//!
//! | band      | score      | default limit |
//! |-----------|------------|---------------|
//! | very low  | 750..      | 500 000       |
//! | low       | 650..750   | 250 000       |
//! | medium    | 550..650   | 100 000       |
//! | high      | 450..550   | 25 000        |
//! | very high | ..450      | 0 (declined)  |

use serde::{Deserialize, Serialize};

use crate::config::{
    BandLimits, BAND_HIGH_FLOOR, BAND_LOW_FLOOR, BAND_MEDIUM_FLOOR, BAND_VERY_LOW_FLOOR,
};

/// Derives a credit limit (minor units) from a risk score.
pub trait LimitPolicy: Send + Sync {
    fn credit_limit(&self, risk_score: u32) -> u64;
}

impl<F> LimitPolicy for F
where
    F: Fn(u32) -> u64 + Send + Sync,
{
    fn credit_limit(&self, risk_score: u32) -> u64 {
        self(risk_score)
    }
}

/// Risk category of a score. Higher scores mean lower risk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskBand {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskBand {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= BAND_VERY_LOW_FLOOR => RiskBand::VeryLow,
            s if s >= BAND_LOW_FLOOR => RiskBand::Low,
            s if s >= BAND_MEDIUM_FLOOR => RiskBand::Medium,
            s if s >= BAND_HIGH_FLOOR => RiskBand::High,
            _ => RiskBand::VeryHigh,
        }
    }
}

/// Flat limit per [`RiskBand`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RiskBandPolicy {
    limits: BandLimits,
}

impl RiskBandPolicy {
    pub fn new(limits: BandLimits) -> Self {
        Self { limits }
    }

    pub fn limit_for(&self, band: RiskBand) -> u64 {
        match band {
            RiskBand::VeryLow => self.limits.very_low,
            RiskBand::Low => self.limits.low,
            RiskBand::Medium => self.limits.medium,
            RiskBand::High => self.limits.high,
            RiskBand::VeryHigh => self.limits.very_high,
        }
    }
}

impl LimitPolicy for RiskBandPolicy {
    fn credit_limit(&self, risk_score: u32) -> u64 {
        self.limit_for(RiskBand::from_score(risk_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries() {
        assert_eq!(RiskBand::from_score(850), RiskBand::VeryLow);
        assert_eq!(RiskBand::from_score(750), RiskBand::VeryLow);
        assert_eq!(RiskBand::from_score(749), RiskBand::Low);
        assert_eq!(RiskBand::from_score(650), RiskBand::Low);
        assert_eq!(RiskBand::from_score(649), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(550), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(549), RiskBand::High);
        assert_eq!(RiskBand::from_score(450), RiskBand::High);
        assert_eq!(RiskBand::from_score(449), RiskBand::VeryHigh);
        assert_eq!(RiskBand::from_score(300), RiskBand::VeryHigh);
    }

    #[test]
    fn default_limits() {
        let policy = RiskBandPolicy::default();
        assert_eq!(policy.credit_limit(720), 250_000);
        assert_eq!(policy.credit_limit(800), 500_000);
        assert_eq!(policy.credit_limit(600), 100_000);
        assert_eq!(policy.credit_limit(500), 25_000);
        assert_eq!(policy.credit_limit(400), 0);
    }

    #[test]
    fn closures_are_policies() {
        let linear = |score: u32| u64::from(score) * 10;
        assert_eq!(linear.credit_limit(720), 7_200);
    }
}
