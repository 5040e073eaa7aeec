//! Reputation ledger.
//!
//! One record per (player, target type, target id), holding four
//! dimensions:
//!   - respect, fear, trust in [-100, 100]
//!   - heat in [0, 100]
//!
//! Applying a change clamps each touched dimension to its bound, recomputes
//! the combined score and standing, and yields one audit row for every
//! dimension whose stored value actually moved. Clamping is normal
//! behaviour, not an error.
//!
//! The ledger itself is pure; the engine loads records, runs `apply` for
//! the primary target and each propagated target inside one transaction,
//! and persists the results.

use crate::{
    config::ReputationConfig,
    error::{WorldError, WorldResult},
    standing::{ReputationDimension, ReputationScore, Standing},
    types::{PlayerId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    District,
    Faction,
    Crew,
    Player,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::District => "district",
            Self::Faction  => "faction",
            Self::Crew     => "crew",
            Self::Player   => "player",
        }
    }
}

impl FromStr for TargetType {
    type Err = WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "district" => Ok(Self::District),
            "faction"  => Ok(Self::Faction),
            "crew"     => Ok(Self::Crew),
            "player"   => Ok(Self::Player),
            other => Err(WorldError::UnknownTarget {
                target_type: other.to_string(),
                target_id:   String::new(),
            }),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReputationTarget {
    pub target_type: TargetType,
    pub target_id:   String,
}

impl ReputationTarget {
    pub fn new(target_type: TargetType, target_id: impl Into<String>) -> Self {
        Self { target_type, target_id: target_id.into() }
    }

    pub fn faction(id: impl Into<String>) -> Self {
        Self::new(TargetType::Faction, id)
    }

    pub fn district(id: impl Into<String>) -> Self {
        Self::new(TargetType::District, id)
    }
}

impl fmt::Display for ReputationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.target_id)
    }
}

/// Requested deltas. `None` leaves a dimension untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReputationChanges {
    #[serde(default)]
    pub respect: Option<f64>,
    #[serde(default)]
    pub fear:    Option<f64>,
    #[serde(default)]
    pub trust:   Option<f64>,
    #[serde(default)]
    pub heat:    Option<f64>,
}

impl ReputationChanges {
    pub fn respect(delta: f64) -> Self {
        Self { respect: Some(delta), ..Default::default() }
    }

    pub fn get(&self, dim: ReputationDimension) -> Option<f64> {
        match dim {
            ReputationDimension::Respect => self.respect,
            ReputationDimension::Fear    => self.fear,
            ReputationDimension::Trust   => self.trust,
            ReputationDimension::Heat    => self.heat,
        }
    }

    /// Every present delta multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            respect: self.respect.map(|d| d * factor),
            fear:    self.fear.map(|d| d * factor),
            trust:   self.trust.map(|d| d * factor),
            heat:    self.heat.map(|d| d * factor),
        }
    }

    /// At least one dimension present, and all present deltas finite.
    pub fn validate(&self) -> WorldResult<()> {
        let present: Vec<(ReputationDimension, f64)> = ReputationDimension::ALL
            .iter()
            .filter_map(|&d| self.get(d).map(|v| (d, v)))
            .collect();
        if present.is_empty() {
            return Err(WorldError::MalformedChanges { reason: "no dimension given".into() });
        }
        if let Some((dim, v)) = present.iter().find(|(_, v)| !v.is_finite()) {
            return Err(WorldError::MalformedChanges {
                reason: format!("{} delta is not finite ({v})", dim.as_str()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub record_id:      String,
    pub player_id:      PlayerId,
    pub target:         ReputationTarget,
    pub score:          ReputationScore,
    pub standing:       Standing,
    pub combined_score: f64,
    pub last_updated:   Timestamp,
}

impl ReputationRecord {
    /// A never-touched relationship: all zeros, `unknown`.
    pub fn blank(player_id: &str, target: ReputationTarget, at: Timestamp) -> Self {
        Self {
            record_id:      uuid::Uuid::new_v4().to_string(),
            player_id:      player_id.to_string(),
            target,
            score:          ReputationScore::default(),
            standing:       Standing::Unknown,
            combined_score: 0.0,
            last_updated:   at,
        }
    }
}

/// One audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub player_id:         PlayerId,
    pub target:            ReputationTarget,
    pub dimension:         ReputationDimension,
    pub old_value:         f64,
    pub new_value:         f64,
    pub reason:            String,
    pub related_player_id: Option<PlayerId>,
    pub metadata:          serde_json::Value,
    /// Set when this row came from propagation; names the primary target.
    pub propagated_from:   Option<ReputationTarget>,
    pub created_at:        Timestamp,
}

/// Per-dimension result of one application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionChange {
    pub dimension: ReputationDimension,
    pub requested: f64,
    pub old_value: f64,
    pub new_value: f64,
    pub clamped:   bool,
}

/// What happened to one target during a `modify_reputation` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationModification {
    pub target:          ReputationTarget,
    /// 1.0 for the primary target.
    pub multiplier:      f64,
    pub propagated:      bool,
    pub changes:         Vec<DimensionChange>,
    pub old_score:       ReputationScore,
    pub new_score:       ReputationScore,
    pub old_standing:    Standing,
    pub new_standing:    Standing,
    pub combined_score:  f64,
}

impl ReputationModification {
    pub fn any_clamped(&self) -> bool {
        self.changes.iter().any(|c| c.clamped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyReputationRequest {
    pub player_id: PlayerId,
    pub target:    ReputationTarget,
    pub changes:   ReputationChanges,
    pub reason:    String,
    #[serde(default)]
    pub related_player_id: Option<PlayerId>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ModifyReputationRequest {
    pub fn new(
        player_id: impl Into<String>,
        target:    ReputationTarget,
        changes:   ReputationChanges,
        reason:    impl Into<String>,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            target,
            changes,
            reason: reason.into(),
            related_player_id: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyReputationResponse {
    pub player_id:     PlayerId,
    /// Primary first, then propagated targets in registration order.
    pub modifications: Vec<ReputationModification>,
}

impl ModifyReputationResponse {
    pub fn primary(&self) -> Option<&ReputationModification> {
        self.modifications.first()
    }

    pub fn propagated(&self) -> impl Iterator<Item = &ReputationModification> {
        self.modifications.iter().skip(1)
    }

    pub fn for_target(&self, target: &ReputationTarget) -> Option<&ReputationModification> {
        self.modifications.iter().find(|m| &m.target == target)
    }
}

/// Highest value seen on one dimension across a player's records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionPeak {
    pub target: ReputationTarget,
    pub value:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationSummary {
    pub highest_respect:    Option<DimensionPeak>,
    pub highest_fear:       Option<DimensionPeak>,
    pub highest_trust:      Option<DimensionPeak>,
    pub highest_heat:       Option<DimensionPeak>,
    pub overall_standing:   Standing,
    pub average_reputation: f64,
    pub record_count:       usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationWeb {
    pub player_id: PlayerId,
    pub by_type:   BTreeMap<TargetType, Vec<ReputationRecord>>,
    pub summary:   ReputationSummary,
}

pub struct ReputationLedger<'a> {
    config: &'a ReputationConfig,
}

impl<'a> ReputationLedger<'a> {
    pub fn new(config: &'a ReputationConfig) -> Self {
        Self { config }
    }

    /// Apply `changes` to `record` in place. Returns the per-dimension
    /// outcome for every dimension that was present in `changes`.
    pub fn apply(
        &self,
        record:  &mut ReputationRecord,
        changes: &ReputationChanges,
        at:      Timestamp,
    ) -> Vec<DimensionChange> {
        let mut out = Vec::new();
        for dim in ReputationDimension::ALL {
            let Some(delta) = changes.get(dim) else { continue };
            let (lo, hi) = dim.bounds();
            let old_value = record.score.get(dim);
            let raw = old_value + delta;
            let new_value = raw.clamp(lo, hi);
            record.score.set(dim, new_value);
            out.push(DimensionChange {
                dimension: dim,
                requested: delta,
                old_value,
                new_value,
                clamped: raw != new_value,
            });
        }
        self.rescore(record);
        record.last_updated = at;
        out
    }

    /// Recompute combined score and standing from the current dimensions.
    pub fn rescore(&self, record: &mut ReputationRecord) {
        record.combined_score = record.score.combined(&self.config.weights);
        record.standing = self.config.standing.classify(&record.score, record.combined_score);
    }

    /// Group records by target type and summarise them.
    pub fn web(&self, player_id: &str, records: Vec<ReputationRecord>) -> ReputationWeb {
        let summary = self.summarise(&records);
        let mut by_type: BTreeMap<TargetType, Vec<ReputationRecord>> = BTreeMap::new();
        for r in records {
            by_type.entry(r.target.target_type).or_default().push(r);
        }
        ReputationWeb { player_id: player_id.to_string(), by_type, summary }
    }

    fn summarise(&self, records: &[ReputationRecord]) -> ReputationSummary {
        let peak = |dim: ReputationDimension| {
            records
                .iter()
                .max_by(|a, b| a.score.get(dim).total_cmp(&b.score.get(dim)))
                .map(|r| DimensionPeak { target: r.target.clone(), value: r.score.get(dim) })
        };

        if records.is_empty() {
            return ReputationSummary {
                highest_respect: None,
                highest_fear: None,
                highest_trust: None,
                highest_heat: None,
                overall_standing: Standing::Unknown,
                average_reputation: 0.0,
                record_count: 0,
            };
        }

        let n = records.len() as f64;
        let mean = ReputationScore {
            respect: records.iter().map(|r| r.score.respect).sum::<f64>() / n,
            fear:    records.iter().map(|r| r.score.fear).sum::<f64>() / n,
            trust:   records.iter().map(|r| r.score.trust).sum::<f64>() / n,
            heat:    records.iter().map(|r| r.score.heat).sum::<f64>() / n,
        };
        let mean_combined = mean.combined(&self.config.weights);

        ReputationSummary {
            highest_respect: peak(ReputationDimension::Respect),
            highest_fear: peak(ReputationDimension::Fear),
            highest_trust: peak(ReputationDimension::Trust),
            highest_heat: peak(ReputationDimension::Heat),
            overall_standing: self.config.standing.classify(&mean, mean_combined),
            average_reputation: records.iter().map(|r| r.combined_score).sum::<f64>() / n,
            record_count: records.len(),
        }
    }
}
