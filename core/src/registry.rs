//! Static world registries: factions, districts and district adjacency.
//!
//! Loaded once at startup and never mutated. The engine holds one
//! `WorldRegistry` and passes it by reference to every component that
//! needs a lookup. Registration order is preserved: propagation visits
//! allies, enemies and neighbours in the order they appear here.

use crate::types::{DistrictId, FactionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    pub id: FactionId,
    pub name: String,
    pub home_district: Option<DistrictId>,
    #[serde(default)]
    pub allied_districts: Vec<DistrictId>,
    #[serde(default)]
    pub allies: Vec<FactionId>,
    #[serde(default)]
    pub enemies: Vec<FactionId>,
    // Declared for future tuning; propagation does not read these yet.
    #[serde(default)]
    pub values_loyalty: bool,
    #[serde(default)]
    pub values_violence: bool,
    #[serde(default)]
    pub values_business: bool,
}

/// Starting metrics for a district before any event has been folded in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistrictBaseline {
    pub crime_index: f64,
    pub police_presence: f64,
    pub property_values: f64,
    pub business_health: f64,
    pub street_activity: f64,
    #[serde(default)]
    pub active_businesses: i64,
}

impl Default for DistrictBaseline {
    fn default() -> Self {
        Self {
            crime_index: 20.0,
            police_presence: 50.0,
            property_values: 50.0,
            business_health: 50.0,
            street_activity: 50.0,
            active_businesses: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub id: DistrictId,
    pub name: String,
    /// The faction that runs this district, if any.
    #[serde(default)]
    pub faction: Option<FactionId>,
    #[serde(default)]
    pub baseline: DistrictBaseline,
}

#[derive(Debug, Clone, Deserialize)]
struct FactionsFile {
    factions: Vec<Faction>,
}

#[derive(Debug, Clone, Deserialize)]
struct DistrictsFile {
    districts: Vec<District>,
    #[serde(default)]
    adjacency: HashMap<DistrictId, Vec<DistrictId>>,
}

#[derive(Debug, Clone, Default)]
pub struct WorldRegistry {
    factions:        Vec<Faction>,
    districts:       Vec<District>,
    adjacency:       HashMap<DistrictId, Vec<DistrictId>>,
    faction_index:   HashMap<FactionId, usize>,
    district_index:  HashMap<DistrictId, usize>,
}

impl WorldRegistry {
    /// Load from `{data_dir}/world/factions.json` and `districts.json`.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let factions_path = format!("{data_dir}/world/factions.json");
        let factions_content = std::fs::read_to_string(&factions_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {factions_path}: {e}"))?;
        let factions_file: FactionsFile = serde_json::from_str(&factions_content)?;

        let districts_path = format!("{data_dir}/world/districts.json");
        let districts_content = std::fs::read_to_string(&districts_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {districts_path}: {e}"))?;
        let districts_file: DistrictsFile = serde_json::from_str(&districts_content)?;

        Ok(Self::from_parts(
            factions_file.factions,
            districts_file.districts,
            districts_file.adjacency,
        ))
    }

    /// Build a registry in code. Duplicate ids keep the first registration.
    pub fn from_parts(
        factions:  Vec<Faction>,
        districts: Vec<District>,
        adjacency: HashMap<DistrictId, Vec<DistrictId>>,
    ) -> Self {
        let mut registry = Self::default();
        for f in factions {
            if registry.faction_index.contains_key(&f.id) {
                log::warn!("duplicate faction '{}' in registry, ignoring", f.id);
                continue;
            }
            registry.faction_index.insert(f.id.clone(), registry.factions.len());
            registry.factions.push(f);
        }
        for d in districts {
            if registry.district_index.contains_key(&d.id) {
                log::warn!("duplicate district '{}' in registry, ignoring", d.id);
                continue;
            }
            registry.district_index.insert(d.id.clone(), registry.districts.len());
            registry.districts.push(d);
        }
        registry.adjacency = adjacency;
        registry.check_integrity();
        registry
    }

    /// Dangling references are tolerated (propagation skips them), but
    /// they are reported once at load time.
    fn check_integrity(&self) {
        for f in &self.factions {
            for other in f.allies.iter().chain(&f.enemies) {
                if !self.faction_index.contains_key(other) {
                    log::warn!("faction '{}' references unknown faction '{other}'", f.id);
                }
            }
            if let Some(home) = &f.home_district {
                if !self.district_index.contains_key(home) {
                    log::warn!("faction '{}' has unknown home district '{home}'", f.id);
                }
            }
        }
        for (district, neighbours) in &self.adjacency {
            for n in neighbours {
                if !self.district_index.contains_key(n) {
                    log::warn!("district '{district}' is adjacent to unknown district '{n}'");
                }
            }
        }
    }

    pub fn faction(&self, id: &str) -> Option<&Faction> {
        self.faction_index.get(id).map(|&i| &self.factions[i])
    }

    pub fn district(&self, id: &str) -> Option<&District> {
        self.district_index.get(id).map(|&i| &self.districts[i])
    }

    pub fn factions(&self) -> &[Faction] {
        &self.factions
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    /// Neighbours of `district_id` as listed in the adjacency map.
    pub fn adjacent(&self, district_id: &str) -> &[DistrictId] {
        self.adjacency
            .get(district_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The district's explicit faction, else the first faction that calls
    /// it home.
    pub fn faction_for_district(&self, district_id: &str) -> Option<&FactionId> {
        if let Some(f) = self.district(district_id).and_then(|d| d.faction.as_ref()) {
            return Some(f);
        }
        self.factions
            .iter()
            .find(|f| f.home_district.as_deref() == Some(district_id))
            .map(|f| &f.id)
    }
}
