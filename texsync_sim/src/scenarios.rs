//! Fault scenarios for deterministic replication testing.

use serde::{Serialize, Serializer};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// TSX-001: Clean network, every follower applies every tick
    Steady,
    
    /// TSX-002: 40% snapshot loss on every link
    Lossy,
    
    /// TSX-003: Duplicated deliveries combined with loss
    Duplicates,
    
    /// TSX-004: Latency plus jitter, snapshots arrive out of order
    Reorder,
    
    /// TSX-005: One follower cut off for the middle third, then healed
    Partition,
    
    /// TSX-006: Authority reset halfway through
    ResetMidRun,
    
    /// TSX-007: Forced regenerations on top of the cadence
    ForcedRegen,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::Lossy,
            ScenarioId::Duplicates,
            ScenarioId::Reorder,
            ScenarioId::Partition,
            ScenarioId::ResetMidRun,
            ScenarioId::ForcedRegen,
        ]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::Lossy => "lossy",
            ScenarioId::Duplicates => "duplicates",
            ScenarioId::Reorder => "reorder",
            ScenarioId::Partition => "partition",
            ScenarioId::ResetMidRun => "reset_midrun",
            ScenarioId::ForcedRegen => "forced_regen",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "Clean links, followers apply once per version and track the authority",
            ScenarioId::Lossy => "40% loss, followers skip versions but never re-apply one",
            ScenarioId::Duplicates => "50% duplication + 20% loss, repeated versions are not re-applied",
            ScenarioId::Reorder => "2-tick latency + 0..4 jitter, older versions still count as changes",
            ScenarioId::Partition => "Follower 0 partitioned for the middle third, frozen then caught up",
            ScenarioId::ResetMidRun => "Authority reset halfway, versions restart and are applied again",
            ScenarioId::ForcedRegen => "Regenerate every 7 ticks on top of the 30-tick cadence",
        }
    }
    
    /// Returns true if the scenario injects link faults.
    pub fn has_link_faults(&self) -> bool {
        matches!(
            self,
            ScenarioId::Lossy | ScenarioId::Duplicates | ScenarioId::Reorder | ScenarioId::Partition
        )
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Serialize for ScenarioId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady" | "tsx-001" => Ok(ScenarioId::Steady),
            "lossy" | "loss" | "tsx-002" => Ok(ScenarioId::Lossy),
            "duplicates" | "dup" | "tsx-003" => Ok(ScenarioId::Duplicates),
            "reorder" | "jitter" | "tsx-004" => Ok(ScenarioId::Reorder),
            "partition" | "tsx-005" => Ok(ScenarioId::Partition),
            "reset_midrun" | "reset" | "tsx-006" => Ok(ScenarioId::ResetMidRun),
            "forced_regen" | "regen" | "tsx-007" => Ok(ScenarioId::ForcedRegen),
            // Groups
            "all" => Err("Use --scenario all to run every scenario".to_string()),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }
    
    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("TSX-004".parse::<ScenarioId>(), Ok(ScenarioId::Reorder));
        assert_eq!("Reset".parse::<ScenarioId>(), Ok(ScenarioId::ResetMidRun));
        assert!("all".parse::<ScenarioId>().is_err());
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
    
    #[test]
    fn test_fault_classification() {
        assert!(!ScenarioId::Steady.has_link_faults());
        assert!(ScenarioId::Partition.has_link_faults());
        assert!(!ScenarioId::ForcedRegen.has_link_faults());
        assert_eq!(ScenarioId::all().len(), 7);
    }
}
