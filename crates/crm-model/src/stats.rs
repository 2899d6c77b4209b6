use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Usage statistics attached by `StatsEnricher`: record count,
/// sampled field fill rates, picklist distributions, freshness, and the
/// profiles that own the most records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsBlock {
    pub record_count: u64,
    /// Field name -> fraction of sampled records with a non-null value.
    pub field_fill_rates: HashMap<String, f64>,
    /// Picklist field name -> (value -> count) over the sampled set.
    pub picklist_distributions: HashMap<String, HashMap<String, u64>>,
    /// Fraction of records modified within the freshness window.
    pub freshness_fraction: f64,
    pub top_owning_profiles: Vec<String>,
}
