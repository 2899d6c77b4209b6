//! stderr-substring classification table.
//!
//! The table is deliberately a flat list of `(substring, Classification)`
//! pairs checked in order, not a regex engine: the tenant CLI's error
//! messages are stable strings, and a simple substring scan keeps the
//! classification boundary auditable (a reviewer can read the whole table
//! in one screen).

use crm_core::Classification;

/// One row of the classification table.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    /// Substring to search for in stderr.
    pub marker: &'static str,
    /// Classification to assign when the marker is found.
    pub classification: Classification,
}

/// Default classification table, covering the tenant CLI's documented
/// error markers.
pub const DEFAULT_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        marker: "REQUEST_LIMIT_EXCEEDED",
        classification: Classification::QuotaError,
    },
    ClassificationRule {
        marker: "TotalRequests Limit exceeded",
        classification: Classification::QuotaError,
    },
    ClassificationRule {
        marker: "API_CURRENTLY_DISABLED",
        classification: Classification::QuotaError,
    },
    ClassificationRule {
        marker: "QUERY_TIMEOUT",
        classification: Classification::Timeout,
    },
    ClassificationRule {
        marker: "MALFORMED_QUERY",
        classification: Classification::SyntacticError,
    },
    ClassificationRule {
        marker: "INVALID_FIELD",
        classification: Classification::SyntacticError,
    },
    ClassificationRule {
        marker: "INVALID_TYPE",
        classification: Classification::SyntacticError,
    },
    ClassificationRule {
        marker: "ENOTFOUND",
        classification: Classification::TransportError,
    },
    ClassificationRule {
        marker: "ECONNRESET",
        classification: Classification::TransportError,
    },
    ClassificationRule {
        marker: "socket hang up",
        classification: Classification::TransportError,
    },
];

/// Classifies a completed subprocess invocation.
///
/// `timed_out` takes priority: a process killed because its deadline
/// elapsed is always `Classification::Timeout` regardless of exit code or
/// stderr content. Otherwise a zero exit code is always `Ok`; a non-zero
/// exit code is matched against `rules` in order, and falls back to
/// `TransportError` when no marker matches.
pub fn classify(
    exit_code: Option<i32>,
    stderr: &str,
    timed_out: bool,
    rules: &[ClassificationRule],
) -> Classification {
    if timed_out {
        return Classification::Timeout;
    }

    match exit_code {
        Some(0) => Classification::Ok,
        _ => rules
            .iter()
            .find(|rule| stderr.contains(rule.marker))
            .map(|rule| rule.classification)
            .unwrap_or(Classification::TransportError),
    }
}
