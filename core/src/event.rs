//! District events: the immutable record of a world-changing action.
//!
//! RULE: Events are append-only. Ingestion creates them with
//! `processed = false`; the aggregator flips that flag exactly once.
//! Nothing else ever mutates an event.

use crate::{
    error::{WorldError, WorldResult},
    types::{CrewId, DistrictId, PlayerId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

/// Closed vocabulary of actions that move district metrics.
/// Variants may be appended, never removed or renamed (the wire
/// name is persisted in `district_events.event_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistrictEventType {
    CrimeCommitted,
    PoliceRaid,
    Gentrification,
    CrewBattle,
    Murder,
    DrugDeal,
    BusinessOpened,
    BusinessClosed,
    PropertyPurchased,
    BusinessTransaction,
}

impl DistrictEventType {
    pub const ALL: [DistrictEventType; 10] = [
        Self::CrimeCommitted,
        Self::PoliceRaid,
        Self::Gentrification,
        Self::CrewBattle,
        Self::Murder,
        Self::DrugDeal,
        Self::BusinessOpened,
        Self::BusinessClosed,
        Self::PropertyPurchased,
        Self::BusinessTransaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrimeCommitted      => "crime_committed",
            Self::PoliceRaid          => "police_raid",
            Self::Gentrification      => "gentrification",
            Self::CrewBattle          => "crew_battle",
            Self::Murder              => "murder",
            Self::DrugDeal            => "drug_deal",
            Self::BusinessOpened      => "business_opened",
            Self::BusinessClosed      => "business_closed",
            Self::PropertyPurchased   => "property_purchased",
            Self::BusinessTransaction => "business_transaction",
        }
    }
}

impl FromStr for DistrictEventType {
    type Err = WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| WorldError::UnknownEventType { event_type: s.to_string() })
    }
}

impl fmt::Display for DistrictEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-severity coefficients for one event type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactProfile {
    #[serde(default)]
    pub crime: f64,
    #[serde(default)]
    pub police: f64,
    #[serde(default)]
    pub property: f64,
    #[serde(default)]
    pub business: f64,
    #[serde(default)]
    pub activity: f64,
    /// Heat only ever rises from events; negative values are ignored.
    #[serde(default)]
    pub heat: f64,
    #[serde(default)]
    pub tension: f64,
    /// Counts toward `daily_crime_count`.
    #[serde(default)]
    pub crime_type: bool,
    /// Change applied to `active_businesses` per event (not per severity).
    #[serde(default)]
    pub business_delta: i64,
    /// `metadata.amount` counts toward `daily_transaction_volume`.
    #[serde(default)]
    pub transactional: bool,
}

/// Concrete deltas stamped onto an event at ingestion time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactDeltas {
    pub crime:    f64,
    pub police:   f64,
    pub property: f64,
    pub business: f64,
    pub activity: f64,
    pub heat:     f64,
    pub tension:  f64,
}

/// The static eventType → impact lookup. Built once, shared by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImpactTable {
    entries: HashMap<DistrictEventType, ImpactProfile>,
}

impl ImpactTable {
    /// The stock table shipped with the game.
    pub fn standard() -> Self {
        use DistrictEventType::*;
        let entries = [
            (CrimeCommitted, ImpactProfile {
                crime: 2.0, police: 1.0, activity: 1.0, heat: 1.0,
                crime_type: true, ..Default::default()
            }),
            (PoliceRaid, ImpactProfile {
                police: 3.0, crime: -1.0, ..Default::default()
            }),
            (Gentrification, ImpactProfile {
                property: 3.0, business: 2.0, ..Default::default()
            }),
            (CrewBattle, ImpactProfile {
                tension: 2.0, heat: 1.0, crime_type: true, ..Default::default()
            }),
            (Murder, ImpactProfile {
                crime: 3.0, police: 2.0, property: -1.0, activity: -1.0, heat: 2.0,
                crime_type: true, ..Default::default()
            }),
            (DrugDeal, ImpactProfile {
                crime: 1.0, activity: 1.0, heat: 0.5,
                crime_type: true, ..Default::default()
            }),
            (BusinessOpened, ImpactProfile {
                business: 2.0, property: 1.0, activity: 1.0,
                business_delta: 1, ..Default::default()
            }),
            (BusinessClosed, ImpactProfile {
                business: -2.0, property: -1.0, activity: -1.0,
                business_delta: -1, ..Default::default()
            }),
            (PropertyPurchased, ImpactProfile {
                property: 2.0, business: 1.0,
                transactional: true, ..Default::default()
            }),
            (BusinessTransaction, ImpactProfile {
                business: 0.5, activity: 0.5,
                transactional: true, ..Default::default()
            }),
        ]
        .into_iter()
        .collect();
        Self { entries }
    }

    pub fn profile(&self, event_type: DistrictEventType) -> WorldResult<&ImpactProfile> {
        self.entries
            .get(&event_type)
            .ok_or_else(|| WorldError::UnknownEventType {
                event_type: event_type.as_str().to_string(),
            })
    }

    /// Scale a profile by severity into concrete deltas.
    pub fn impacts_for(&self, event_type: DistrictEventType, severity: u8) -> WorldResult<ImpactDeltas> {
        let p = self.profile(event_type)?;
        let s = f64::from(severity);
        Ok(ImpactDeltas {
            crime:    p.crime * s,
            police:   p.police * s,
            property: p.property * s,
            business: p.business * s,
            activity: p.activity * s,
            heat:     (p.heat * s).max(0.0),
            tension:  p.tension * s,
        })
    }
}

impl Default for ImpactTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// What a collaborator submits to `log_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDistrictEvent {
    pub district_id: DistrictId,
    pub event_type: String,
    pub severity: i64,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub target_player_id: Option<PlayerId>,
    #[serde(default)]
    pub crew_id: Option<CrewId>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Defaults to the engine clock's "now".
    #[serde(default)]
    pub occurred_at: Option<Timestamp>,
}

impl NewDistrictEvent {
    pub fn new(district_id: impl Into<String>, event_type: impl Into<String>, severity: i64) -> Self {
        Self {
            district_id: district_id.into(),
            event_type: event_type.into(),
            severity,
            player_id: None,
            target_player_id: None,
            crew_id: None,
            metadata: None,
            occurred_at: None,
        }
    }

    pub fn by_player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    pub fn against(mut self, target_player_id: impl Into<String>) -> Self {
        self.target_player_id = Some(target_player_id.into());
        self
    }

    pub fn with_crew(mut self, crew_id: impl Into<String>) -> Self {
        self.crew_id = Some(crew_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn at(mut self, occurred_at: Timestamp) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// A persisted district event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictEvent {
    pub event_id:         String,
    pub district_id:      DistrictId,
    pub event_type:       DistrictEventType,
    pub severity:         u8,
    pub actor_player_id:  Option<PlayerId>,
    pub target_player_id: Option<PlayerId>,
    pub crew_id:          Option<CrewId>,
    pub impacts:          ImpactDeltas,
    pub metadata:         serde_json::Value,
    pub processed:        bool,
    pub occurred_at:      Timestamp,
}

impl DistrictEvent {
    /// `metadata.amount` when present, finite and non-negative.
    pub fn transaction_amount(&self) -> f64 {
        self.metadata
            .get("amount")
            .and_then(serde_json::Value::as_f64)
            .filter(|a| a.is_finite() && *a >= 0.0)
            .unwrap_or(0.0)
    }
}
