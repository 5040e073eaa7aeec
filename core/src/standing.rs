//! Reputation score model and the standing classifier.
//!
//! `StandingThresholds::classify` is pure: the same score always yields
//! the same standing, and the ordered rules cover every possible score
//! exactly once (`Unknown` is the catch-all).

use crate::config::{CombinedScoreWeights, StandingThresholds};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SOCIAL_MIN: f64 = -100.0;
pub const SOCIAL_MAX: f64 = 100.0;
pub const HEAT_MIN: f64 = 0.0;
pub const HEAT_MAX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationDimension {
    Respect,
    Fear,
    Trust,
    Heat,
}

impl ReputationDimension {
    pub const ALL: [ReputationDimension; 4] = [Self::Respect, Self::Fear, Self::Trust, Self::Heat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Respect => "respect",
            Self::Fear    => "fear",
            Self::Trust   => "trust",
            Self::Heat    => "heat",
        }
    }

    /// Inclusive (min, max) for this dimension.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Self::Heat => (HEAT_MIN, HEAT_MAX),
            _          => (SOCIAL_MIN, SOCIAL_MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReputationScore {
    pub respect: f64,
    pub fear:    f64,
    pub trust:   f64,
    pub heat:    f64,
}

impl ReputationScore {
    pub fn get(&self, dim: ReputationDimension) -> f64 {
        match dim {
            ReputationDimension::Respect => self.respect,
            ReputationDimension::Fear    => self.fear,
            ReputationDimension::Trust   => self.trust,
            ReputationDimension::Heat    => self.heat,
        }
    }

    pub fn set(&mut self, dim: ReputationDimension, value: f64) {
        match dim {
            ReputationDimension::Respect => self.respect = value,
            ReputationDimension::Fear    => self.fear = value,
            ReputationDimension::Trust   => self.trust = value,
            ReputationDimension::Heat    => self.heat = value,
        }
    }

    /// Weighted blend, heat counting against. Clamped to [-100, 100].
    pub fn combined(&self, w: &CombinedScoreWeights) -> f64 {
        (w.respect * self.respect + w.fear * self.fear + w.trust * self.trust - w.heat * self.heat)
            .clamp(SOCIAL_MIN, SOCIAL_MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    Legendary,
    Notorious,
    Hated,
    Feared,
    Respected,
    Trusted,
    Known,
    Unknown,
}

impl Standing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legendary => "legendary",
            Self::Notorious => "notorious",
            Self::Hated     => "hated",
            Self::Feared    => "feared",
            Self::Respected => "respected",
            Self::Trusted   => "trusted",
            Self::Known     => "known",
            Self::Unknown   => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Legendary, Self::Notorious, Self::Hated, Self::Feared,
            Self::Respected, Self::Trusted, Self::Known, Self::Unknown,
        ]
        .into_iter()
        .find(|st| st.as_str() == s)
    }
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StandingThresholds {
    /// First matching rule wins.
    pub fn classify(&self, score: &ReputationScore, combined: f64) -> Standing {
        let magnitude = score.respect.abs().max(score.fear.abs()).max(score.trust.abs());

        if combined >= self.legendary_combined && score.heat < self.legendary_heat_below {
            Standing::Legendary
        } else if score.fear >= self.notorious_fear && score.respect < self.notorious_respect_below {
            Standing::Notorious
        } else if score.respect <= self.hated_at_or_below || score.trust <= self.hated_at_or_below {
            Standing::Hated
        } else if score.fear >= self.feared_fear {
            Standing::Feared
        } else if score.respect >= self.respected_respect {
            Standing::Respected
        } else if score.trust >= self.trusted_trust {
            Standing::Trusted
        } else if magnitude >= self.known_magnitude {
            Standing::Known
        } else {
            Standing::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stock weights and thresholds.
    fn classify(score: &ReputationScore) -> Standing {
        let combined = score.combined(&CombinedScoreWeights::default());
        StandingThresholds::default().classify(score, combined)
    }

    fn score(respect: f64, fear: f64, trust: f64, heat: f64) -> ReputationScore {
        ReputationScore { respect, fear, trust, heat }
    }

    #[test]
    fn priority_order_first_match_wins() {
        // Everything maxed with low heat is legendary, not feared/respected.
        assert_eq!(classify(&score(100.0, 100.0, 100.0, 0.0)), Standing::Legendary);
        // Same but hot: falls through to feared (fear checked before respect).
        assert_eq!(classify(&score(100.0, 100.0, 100.0, 60.0)), Standing::Feared);
        // Feared and disrespected.
        assert_eq!(classify(&score(-10.0, 75.0, 0.0, 0.0)), Standing::Notorious);
        // Notorious outranks hated.
        assert_eq!(classify(&score(-80.0, 90.0, 0.0, 0.0)), Standing::Notorious);
        assert_eq!(classify(&score(-50.0, 0.0, 0.0, 0.0)), Standing::Hated);
        assert_eq!(classify(&score(0.0, 0.0, -50.0, 0.0)), Standing::Hated);
        assert_eq!(classify(&score(0.0, 60.0, 0.0, 0.0)), Standing::Feared);
        assert_eq!(classify(&score(60.0, 0.0, 0.0, 0.0)), Standing::Respected);
        assert_eq!(classify(&score(0.0, 0.0, 60.0, 0.0)), Standing::Trusted);
        assert_eq!(classify(&score(0.0, -20.0, 0.0, 0.0)), Standing::Known);
        assert_eq!(classify(&score(19.9, -19.9, 19.9, 100.0)), Standing::Unknown);
    }

    #[test]
    fn legendary_needs_cool_heat() {
        let w = CombinedScoreWeights::default();
        let s = score(100.0, 100.0, 100.0, 49.9);
        assert!(s.combined(&w) >= 80.0);
        assert_eq!(classify(&s), Standing::Legendary);
        assert_eq!(classify(&score(100.0, 100.0, 100.0, 50.0)), Standing::Feared);
    }

    #[test]
    fn combined_score_weights_and_clamp() {
        let w = CombinedScoreWeights::default();
        let s = score(50.0, 20.0, -10.0, 30.0);
        // 20 + 6 - 3 - 6
        assert!((s.combined(&w) - 17.0).abs() < 1e-9);
        assert_eq!(score(-100.0, -100.0, -100.0, 100.0).combined(&w), -100.0);
    }

    #[test]
    fn classify_is_total_and_deterministic() {
        let steps = [-100.0, -70.0, -50.0, -20.0, 0.0, 20.0, 59.9, 60.0, 70.0, 100.0];
        let heats = [0.0, 49.9, 50.0, 100.0];
        for &r in &steps {
            for &f in &steps {
                for &t in &steps {
                    for &h in &heats {
                        let s = score(r, f, t, h);
                        let first = classify(&s);
                        assert_eq!(first, classify(&s));
                        assert_eq!(Standing::parse(first.as_str()), Some(first));
                    }
                }
            }
        }
    }
}
