//! Reputation propagation through the faction/district graph.
//!
//! A change to a faction ripples to:
//!   - each ally       × allied_faction_multiplier
//!   - each enemy      × enemy_faction_multiplier
//!   - its home district × district_faction_multiplier
//!
//! A change to a district ripples to:
//!   - its faction (if any)      × home_district_multiplier
//!   - each adjacent district    × adjacent_district_multiplier
//!
//! Crew and player targets do not propagate.
//!
//! RULE: exactly one hop. `plan` is only ever called for the primary
//! target; propagated changes are applied without planning, so cyclic
//! alliance graphs always terminate.

use crate::{
    config::PropagationConfig,
    registry::WorldRegistry,
    reputation_subsystem::{ReputationChanges, ReputationTarget, TargetType},
};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct PropagatedChange {
    pub target:     ReputationTarget,
    pub multiplier: f64,
    pub changes:    ReputationChanges,
}

pub struct PropagationEngine<'a> {
    config:   &'a PropagationConfig,
    registry: &'a WorldRegistry,
}

impl<'a> PropagationEngine<'a> {
    pub fn new(config: &'a PropagationConfig, registry: &'a WorldRegistry) -> Self {
        Self { config, registry }
    }

    /// Secondary changes for a primary change to `source`, in registration
    /// order. Stale registry ids are logged and skipped. The source itself
    /// and repeated targets are never included twice.
    pub fn plan(&self, source: &ReputationTarget, changes: &ReputationChanges) -> Vec<PropagatedChange> {
        let mut candidates: Vec<(ReputationTarget, f64)> = Vec::new();

        match source.target_type {
            TargetType::Faction => {
                let Some(faction) = self.registry.faction(&source.target_id) else {
                    return Vec::new();
                };
                for ally in &faction.allies {
                    candidates.push((ReputationTarget::faction(ally), self.config.allied_faction_multiplier));
                }
                for enemy in &faction.enemies {
                    candidates.push((ReputationTarget::faction(enemy), self.config.enemy_faction_multiplier));
                }
                if let Some(home) = &faction.home_district {
                    candidates.push((ReputationTarget::district(home), self.config.district_faction_multiplier));
                }
            }
            TargetType::District => {
                if let Some(faction_id) = self.registry.faction_for_district(&source.target_id) {
                    candidates.push((ReputationTarget::faction(faction_id), self.config.home_district_multiplier));
                }
                for neighbour in self.registry.adjacent(&source.target_id) {
                    candidates.push((ReputationTarget::district(neighbour), self.config.adjacent_district_multiplier));
                }
            }
            TargetType::Crew | TargetType::Player => {}
        }

        let mut seen: HashSet<ReputationTarget> = HashSet::new();
        seen.insert(source.clone());

        let mut out = Vec::with_capacity(candidates.len());
        for (target, multiplier) in candidates {
            if !self.is_registered(&target) {
                log::warn!(
                    "data integrity: {source} propagates to unregistered {target}, skipping"
                );
                continue;
            }
            if !seen.insert(target.clone()) {
                log::debug!("{source}: {target} already receives a change, skipping duplicate");
                continue;
            }
            out.push(PropagatedChange {
                changes: changes.scaled(multiplier),
                target,
                multiplier,
            });
        }
        out
    }

    fn is_registered(&self, target: &ReputationTarget) -> bool {
        match target.target_type {
            TargetType::Faction  => self.registry.faction(&target.target_id).is_some(),
            TargetType::District => self.registry.district(&target.target_id).is_some(),
            TargetType::Crew | TargetType::Player => false,
        }
    }
}
