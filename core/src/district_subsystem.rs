//! District ecosystem aggregator.
//!
//! Folds a batch of unprocessed `DistrictEvent`s into a district's running
//! metrics and derives its categorical status.
//!
//! Per batch, in order:
//!   1. Idle decay: heat and crew tension bleed off for every hour since
//!      `last_calculated`, even when the batch is empty.
//!   2. Day rollover resets the daily counters.
//!   3. Each event's deltas are weighted by `0.5^(age / half_life)` and
//!      applied; every metric is clamped after every application.
//!   4. Status is re-derived and passed through the hysteresis gate.
//!
//! The fold is pure. Loading, locking and committing live in the engine.

use crate::{
    config::{AggregatorConfig, StatusThresholds},
    event::{DistrictEvent, ImpactTable},
    registry::District,
    types::{hours_between, DistrictId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const METRIC_MIN: f64 = 0.0;
pub const METRIC_MAX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistrictStatus {
    Stable,
    Volatile,
    Warzone,
    Gentrifying,
    Declining,
}

impl DistrictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable      => "stable",
            Self::Volatile    => "volatile",
            Self::Warzone     => "warzone",
            Self::Gentrifying => "gentrifying",
            Self::Declining   => "declining",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [Self::Stable, Self::Volatile, Self::Warzone, Self::Gentrifying, Self::Declining]
            .into_iter()
            .find(|st| st.as_str() == s)
    }
}

impl fmt::Display for DistrictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictState {
    pub district_id:              DistrictId,
    pub crime_index:              f64,
    pub police_presence:          f64,
    pub property_values:          f64,
    pub business_health:          f64,
    pub street_activity:          f64,
    pub heat_level:               f64,
    pub crew_tension:             f64,
    pub daily_crime_count:        i64,
    pub daily_transaction_volume: f64,
    pub active_businesses:        i64,
    pub status:                   DistrictStatus,
    pub last_calculated:          Timestamp,
    pub last_status_change:       Option<Timestamp>,
}

impl DistrictState {
    /// Fresh state seeded from the registry baseline.
    pub fn initial(district: &District, at: Timestamp) -> Self {
        let b = &district.baseline;
        Self {
            district_id:              district.id.clone(),
            crime_index:              clamp_metric(b.crime_index),
            police_presence:          clamp_metric(b.police_presence),
            property_values:          clamp_metric(b.property_values),
            business_health:          clamp_metric(b.business_health),
            street_activity:          clamp_metric(b.street_activity),
            heat_level:               0.0,
            crew_tension:             0.0,
            daily_crime_count:        0,
            daily_transaction_volume: 0.0,
            active_businesses:        b.active_businesses.max(0),
            status:                   DistrictStatus::Stable,
            last_calculated:          at,
            last_status_change:       None,
        }
    }

    /// Equality that ignores `last_calculated`.
    pub fn same_simulated_state(&self, other: &Self) -> bool {
        let mut a = self.clone();
        a.last_calculated = other.last_calculated;
        &a == other
    }
}

pub fn clamp_metric(v: f64) -> f64 {
    if v.is_nan() {
        METRIC_MIN
    } else {
        v.clamp(METRIC_MIN, METRIC_MAX)
    }
}

fn decay_weight(age_hours: f64, half_life_hours: f64) -> f64 {
    if half_life_hours <= 0.0 {
        return 1.0;
    }
    0.5f64.powf(age_hours / half_life_hours)
}

/// A candidate status and how far past its threshold the trigger sits
/// (1.0 = exactly at threshold).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusCandidate {
    pub status:   DistrictStatus,
    pub strength: f64,
}

impl StatusThresholds {
    /// Ordered rules, first match wins. `property_growth` is the fractional
    /// change in property values over the trend window, if a baseline exists.
    pub fn evaluate(&self, s: &DistrictState, property_growth: Option<f64>) -> StatusCandidate {
        let warzone = s.crew_tension >= self.warzone_tension || s.heat_level >= self.warzone_heat;
        if warzone {
            let strength = ratio_above(s.crew_tension, self.warzone_tension)
                .max(ratio_above(s.heat_level, self.warzone_heat));
            return StatusCandidate { status: DistrictStatus::Warzone, strength };
        }

        if s.crime_index >= self.volatile_crime_min && s.police_presence < self.volatile_police_below {
            let strength = ratio_above(s.crime_index, self.volatile_crime_min)
                .min(ratio_below(s.police_presence, self.volatile_police_below));
            return StatusCandidate { status: DistrictStatus::Volatile, strength };
        }

        if let Some(growth) = property_growth {
            if growth >= self.gentrifying_property_growth
                && s.business_health >= self.gentrifying_business_min
            {
                let strength = ratio_above(growth, self.gentrifying_property_growth)
                    .min(ratio_above(s.business_health, self.gentrifying_business_min));
                return StatusCandidate { status: DistrictStatus::Gentrifying, strength };
            }
        }

        if s.business_health < self.declining_business_below
            && s.street_activity < self.declining_activity_below
        {
            let strength = ratio_below(s.business_health, self.declining_business_below)
                .min(ratio_below(s.street_activity, self.declining_activity_below));
            return StatusCandidate { status: DistrictStatus::Declining, strength };
        }

        StatusCandidate { status: DistrictStatus::Stable, strength: 0.0 }
    }
}

fn ratio_above(value: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        f64::INFINITY
    } else {
        value / threshold
    }
}

fn ratio_below(value: f64, threshold: f64) -> f64 {
    if value <= 0.0 {
        f64::INFINITY
    } else {
        threshold / value
    }
}

/// Outcome of folding one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldOutcome {
    pub state:          DistrictState,
    pub status_changed: bool,
    /// A different status qualified but was held back by the cooldown.
    pub suppressed:     Option<DistrictStatus>,
}

pub struct DistrictAggregator<'a> {
    config:     &'a AggregatorConfig,
    thresholds: &'a StatusThresholds,
    impacts:    &'a ImpactTable,
}

impl<'a> DistrictAggregator<'a> {
    pub fn new(
        config:     &'a AggregatorConfig,
        thresholds: &'a StatusThresholds,
        impacts:    &'a ImpactTable,
    ) -> Self {
        Self { config, thresholds, impacts }
    }

    /// Fold `events` (oldest first) into `prior` as of `as_of`.
    /// `property_baseline` is the earliest property sample in the trend window.
    ///
    /// Status is only evaluated when `settle_status` is set. A chunked run
    /// passes it for its last chunk only, so status and its cooldown see the
    /// whole run at once and never the boundaries between chunks.
    pub fn fold(
        &self,
        prior:             &DistrictState,
        events:            &[DistrictEvent],
        as_of:             Timestamp,
        property_baseline: Option<f64>,
        settle_status:     bool,
    ) -> FoldOutcome {
        let mut s = prior.clone();

        let idle_hours = hours_between(prior.last_calculated, as_of);
        s.heat_level = clamp_metric(s.heat_level - self.config.heat_decay_per_hour * idle_hours);
        s.crew_tension = clamp_metric(s.crew_tension - self.config.tension_decay_per_hour * idle_hours);

        if prior.last_calculated.date_naive() != as_of.date_naive() {
            s.daily_crime_count = 0;
            s.daily_transaction_volume = 0.0;
        }

        let hl = &self.config.half_lives;
        for e in events {
            let age = hours_between(e.occurred_at, as_of);
            let d = &e.impacts;

            s.crime_index     = clamp_metric(s.crime_index + d.crime * decay_weight(age, hl.crime_hours));
            s.police_presence = clamp_metric(s.police_presence + d.police * decay_weight(age, hl.police_hours));
            s.property_values = clamp_metric(s.property_values + d.property * decay_weight(age, hl.property_hours));
            s.business_health = clamp_metric(s.business_health + d.business * decay_weight(age, hl.business_hours));
            s.street_activity = clamp_metric(s.street_activity + d.activity * decay_weight(age, hl.activity_hours));
            s.heat_level      = clamp_metric(s.heat_level + d.heat.max(0.0));
            s.crew_tension    = clamp_metric(s.crew_tension + d.tension);

            // The impact table is the source of truth for the counter flags;
            // an event type missing from it only moves the metrics.
            if let Ok(profile) = self.impacts.profile(e.event_type) {
                let same_day = e.occurred_at.date_naive() == as_of.date_naive();
                if profile.crime_type && same_day {
                    s.daily_crime_count += 1;
                }
                if profile.transactional && same_day {
                    s.daily_transaction_volume += e.transaction_amount();
                }
                s.active_businesses = (s.active_businesses + profile.business_delta).max(0);
            }
        }

        s.last_calculated = as_of;
        if !settle_status {
            return FoldOutcome { state: s, status_changed: false, suppressed: None };
        }

        let growth = property_baseline
            .filter(|b| *b > 0.0)
            .map(|b| (s.property_values - b) / b);
        let candidate = self.thresholds.evaluate(&s, growth);

        let mut status_changed = false;
        let mut suppressed = None;
        if candidate.status != prior.status {
            let cooldown_ms = (self.config.cooldown_hours * 3_600_000.0) as i64;
            let in_cooldown = prior
                .last_status_change
                .map(|t| (as_of - t).num_milliseconds() < cooldown_ms)
                .unwrap_or(false);

            if in_cooldown && candidate.strength < self.config.override_ratio {
                suppressed = Some(candidate.status);
            } else {
                s.status = candidate.status;
                s.last_status_change = Some(as_of);
                status_changed = true;
            }
        }

        FoldOutcome { state: s, status_changed, suppressed }
    }
}
