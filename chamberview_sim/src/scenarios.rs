//! Delivery-jitter scenarios for the playback harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Regular fetches with constant small latency
    Steady,
    
    /// Heavy per-response jitter, so batch sizes swing
    Bursty,
    
    /// A third of all fetches fail
    Flaky,
    
    /// The server stops answering for three seconds, then catches up
    Stall,
    
    /// Row-width changes fired in quick bursts while playing
    RelayoutStorm,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::Bursty,
            ScenarioId::Flaky,
            ScenarioId::Stall,
            ScenarioId::RelayoutStorm,
        ]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::Bursty => "bursty",
            ScenarioId::Flaky => "flaky",
            ScenarioId::Stall => "stall",
            ScenarioId::RelayoutStorm => "relayout_storm",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "300ms polling, 20ms latency, no faults",
            ScenarioId::Bursty => "0-400ms response jitter, irregular batch sizes",
            ScenarioId::Flaky => "33% of fetches fail and are retried next interval",
            ScenarioId::Stall => "3s server stall, then one large catch-up batch",
            ScenarioId::RelayoutStorm => "3 relayouts per burst, one broken chamber",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady" => Ok(ScenarioId::Steady),
            "bursty" => Ok(ScenarioId::Bursty),
            "flaky" => Ok(ScenarioId::Flaky),
            "stall" => Ok(ScenarioId::Stall),
            "relayout_storm" | "relayoutstorm" | "storm" => Ok(ScenarioId::RelayoutStorm),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
