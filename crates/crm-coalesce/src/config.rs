use hashbrown::HashMap;

/// Default batch size: at most this many refs per remote query.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Batch-size policy, adjustable per data-type to respect per-query
/// clause-length limits.
#[derive(Debug, Clone)]
pub struct CoalesceConfig {
    pub(crate) default_batch_size: usize,
    pub(crate) per_data_type_batch_size: HashMap<String, usize>,
    pub(crate) schema_version: u32,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            default_batch_size: DEFAULT_BATCH_SIZE,
            per_data_type_batch_size: HashMap::new(),
            schema_version: 1,
        }
    }
}

impl CoalesceConfig {
    pub fn new(schema_version: u32) -> Self {
        Self {
            schema_version,
            ..Self::default()
        }
    }

    pub fn default_batch_size(mut self, size: usize) -> Self {
        self.default_batch_size = size;
        self
    }

    pub fn batch_size_for(mut self, data_type: impl Into<String>, size: usize) -> Self {
        self.per_data_type_batch_size.insert(data_type.into(), size);
        self
    }

    pub(crate) fn batch_size(&self, data_type: &str) -> usize {
        self.per_data_type_batch_size
            .get(data_type)
            .copied()
            .unwrap_or(self.default_batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_batch_size() {
        let config = CoalesceConfig::new(1);
        assert_eq!(config.batch_size("stats"), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn per_data_type_override_applies() {
        let config = CoalesceConfig::new(1).batch_size_for("automation", 50);
        assert_eq!(config.batch_size("automation"), 50);
        assert_eq!(config.batch_size("stats"), DEFAULT_BATCH_SIZE);
    }
}
