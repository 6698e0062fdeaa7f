use chrono::{DateTime, SecondsFormat, Utc};
use serde_derive::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyState {
    Active,
    Inactive,
}

impl OccupancyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyState::Active => "active",
            OccupancyState::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for OccupancyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportTrigger {
    NewActivity(/* watch name */ String),
    Sweep,
}

#[derive(Clone, Debug)]
pub struct StateReport {
    pub state: OccupancyState,
    pub last_seen: DateTime<Utc>,
    pub trigger: ReportTrigger,
}

impl StateReport {
    pub fn new(state: OccupancyState, trigger: ReportTrigger) -> Self {
        StateReport {
            state,
            last_seen: Utc::now(),
            trigger,
        }
    }
}

/// Body pushed to home automation.
#[derive(Debug, Serialize)]
pub struct StateUpdate {
    pub state: OccupancyState,
    pub attributes: StateAttributes,
}

#[derive(Debug, Serialize)]
pub struct StateAttributes {
    pub state: OccupancyState,
    pub last_seen: String,
}

impl From<&StateReport> for StateUpdate {
    fn from(report: &StateReport) -> Self {
        StateUpdate {
            state: report.state,
            attributes: StateAttributes {
                state: report.state,
                last_seen: report.last_seen.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        }
    }
}
