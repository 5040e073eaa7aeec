use crate::event::ImpactTable;
use serde::{Deserialize, Serialize};

// ── Reputation propagation ─────────────────────────────────────────

/// Scales applied when a reputation change ripples to related targets.
/// Loaded once at startup; immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropagationConfig {
    pub allied_faction_multiplier: f64,
    pub enemy_faction_multiplier: f64,
    /// District change → the district's own faction.
    pub home_district_multiplier: f64,
    /// District change → each adjacent district.
    pub adjacent_district_multiplier: f64,
    /// Faction change → the faction's home district.
    pub district_faction_multiplier: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            allied_faction_multiplier: 0.3,
            enemy_faction_multiplier: -0.3,
            home_district_multiplier: 0.5,
            adjacent_district_multiplier: 0.2,
            district_faction_multiplier: 0.25,
        }
    }
}

// ── District aggregation ───────────────────────────────────────────

/// Recency half-life per metric, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricHalfLives {
    pub crime_hours: f64,
    pub police_hours: f64,
    pub property_hours: f64,
    pub business_hours: f64,
    pub activity_hours: f64,
}

impl Default for MetricHalfLives {
    fn default() -> Self {
        Self {
            crime_hours: 6.0,
            police_hours: 12.0,
            property_hours: 24.0,
            business_hours: 24.0,
            activity_hours: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub half_lives: MetricHalfLives,
    pub heat_decay_per_hour: f64,
    pub tension_decay_per_hour: f64,
    pub cooldown_hours: f64,
    /// A trigger at or above this multiple of its threshold bypasses cooldown.
    pub override_ratio: f64,
    pub chunk_size: usize,
    /// Lazy reads recompute state older than this.
    pub aggregation_interval_minutes: i64,
    pub trend_window_days: i64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            half_lives: MetricHalfLives::default(),
            heat_decay_per_hour: 2.0,
            tension_decay_per_hour: 1.0,
            cooldown_hours: 1.0,
            override_ratio: 1.5,
            chunk_size: 500,
            aggregation_interval_minutes: 15,
            trend_window_days: 7,
        }
    }
}

/// Status trigger thresholds, evaluated warzone → volatile → gentrifying
/// → declining → stable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusThresholds {
    pub warzone_tension: f64,
    pub warzone_heat: f64,
    pub volatile_crime_min: f64,
    pub volatile_police_below: f64,
    /// Fractional growth over the trend window (0.15 = +15%).
    pub gentrifying_property_growth: f64,
    pub gentrifying_business_min: f64,
    pub declining_business_below: f64,
    pub declining_activity_below: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            warzone_tension: 70.0,
            warzone_heat: 85.0,
            volatile_crime_min: 60.0,
            volatile_police_below: 40.0,
            gentrifying_property_growth: 0.15,
            gentrifying_business_min: 70.0,
            declining_business_below: 30.0,
            declining_activity_below: 30.0,
        }
    }
}

// ── Reputation scoring ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombinedScoreWeights {
    pub respect: f64,
    pub fear: f64,
    pub trust: f64,
    /// Subtracted.
    pub heat: f64,
}

impl Default for CombinedScoreWeights {
    fn default() -> Self {
        Self { respect: 0.4, fear: 0.3, trust: 0.3, heat: 0.2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandingThresholds {
    pub legendary_combined: f64,
    pub legendary_heat_below: f64,
    pub notorious_fear: f64,
    pub notorious_respect_below: f64,
    pub hated_at_or_below: f64,
    pub feared_fear: f64,
    pub respected_respect: f64,
    pub trusted_trust: f64,
    pub known_magnitude: f64,
}

impl Default for StandingThresholds {
    fn default() -> Self {
        Self {
            legendary_combined: 80.0,
            legendary_heat_below: 50.0,
            notorious_fear: 70.0,
            notorious_respect_below: 0.0,
            hated_at_or_below: -50.0,
            feared_fear: 60.0,
            respected_respect: 60.0,
            trusted_trust: 60.0,
            known_magnitude: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReputationConfig {
    pub weights: CombinedScoreWeights,
    pub standing: StandingThresholds,
}

// ── Top-level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct TuningFile {
    aggregator: AggregatorConfig,
    status_thresholds: StatusThresholds,
    reputation: ReputationConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct ImpactsFile {
    impacts: ImpactTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub propagation: PropagationConfig,
    pub aggregator: AggregatorConfig,
    pub status_thresholds: StatusThresholds,
    pub reputation: ReputationConfig,
    pub impacts: ImpactTable,
}

impl WorldConfig {
    /// Load from the data/ directory.
    /// In tests, use WorldConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let propagation_path = format!("{data_dir}/world/propagation.json");
        let propagation_content = std::fs::read_to_string(&propagation_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {propagation_path}: {e}"))?;
        let propagation: PropagationConfig = serde_json::from_str(&propagation_content)?;

        let tuning_path = format!("{data_dir}/world/tuning.json");
        let tuning_content = std::fs::read_to_string(&tuning_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {tuning_path}: {e}"))?;
        let tuning: TuningFile = serde_json::from_str(&tuning_content)?;

        let impacts_path = format!("{data_dir}/world/impacts.json");
        let impacts_content = std::fs::read_to_string(&impacts_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {impacts_path}: {e}"))?;
        let impacts_file: ImpactsFile = serde_json::from_str(&impacts_content)?;

        if tuning.aggregator.chunk_size == 0 {
            anyhow::bail!("{tuning_path}: aggregator.chunk_size must be positive");
        }

        Ok(Self {
            propagation,
            aggregator: tuning.aggregator,
            status_thresholds: tuning.status_thresholds,
            reputation: tuning.reputation,
            impacts: impacts_file.impacts,
        })
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            propagation: PropagationConfig::default(),
            aggregator: AggregatorConfig::default(),
            status_thresholds: StatusThresholds::default(),
            reputation: ReputationConfig::default(),
            impacts: ImpactTable::standard(),
        }
    }
}
