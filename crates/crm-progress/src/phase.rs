use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A pipeline phase, as named by the Orchestrator's phase selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Enumerate,
    Describe,
    Stats,
    Automation,
    Security,
    OrgSecurity,
    Emit,
    Upload,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Enumerate,
        Phase::Describe,
        Phase::Stats,
        Phase::Automation,
        Phase::Security,
        Phase::OrgSecurity,
        Phase::Emit,
        Phase::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Enumerate => "enumerate",
            Phase::Describe => "describe",
            Phase::Stats => "stats",
            Phase::Automation => "automation",
            Phase::Security => "security",
            Phase::OrgSecurity => "org-security",
            Phase::Emit => "emit",
            Phase::Upload => "upload",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enumerate" => Ok(Phase::Enumerate),
            "describe" => Ok(Phase::Describe),
            "stats" => Ok(Phase::Stats),
            "automation" => Ok(Phase::Automation),
            "security" => Ok(Phase::Security),
            "org-security" | "org_security" => Ok(Phase::OrgSecurity),
            "emit" => Ok(Phase::Emit),
            "upload" => Ok(Phase::Upload),
            other => Err(format!("unrecognized phase: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phase_round_trips_through_its_display_string() {
        for phase in Phase::ALL {
            let parsed: Phase = phase.as_str().parse().unwrap();
            assert_eq!(parsed, phase);
        }
    }

    #[test]
    fn org_security_accepts_either_separator() {
        assert_eq!("org-security".parse::<Phase>().unwrap(), Phase::OrgSecurity);
        assert_eq!("org_security".parse::<Phase>().unwrap(), Phase::OrgSecurity);
    }

    #[test]
    fn unknown_phase_is_rejected() {
        assert!("nonexistent".parse::<Phase>().is_err());
    }
}
