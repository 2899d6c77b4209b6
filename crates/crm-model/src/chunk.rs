use serde::{Deserialize, Serialize};

/// Metadata carried alongside a [`Chunk`]'s text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub object_ref: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub content_hash: String,
    pub total_parts: u32,
    pub part_index: u32,
    pub sibling_ids: Vec<String>,
}

/// One unit of the emitted corpus: `{id, text, metadata}`.
/// Ephemeral — produced by the Corpus Emitter, uploaded, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Builds a chunk id from the corpus namespace, object ref, and
    /// 1-indexed part number. Single-chunk objects get
    /// `{namespace}_{ref}`; multi-chunk objects get
    /// `{namespace}_{ref}_part_{n}`.
    pub fn id_for(namespace: &str, object_ref: &str, part_index: u32, total_parts: u32) -> String {
        if total_parts <= 1 {
            format!("{namespace}_{object_ref}")
        } else {
            format!("{namespace}_{object_ref}_part_{part_index}")
        }
    }

    /// The id prefix shared by every chunk belonging to `object_ref`,
    /// used by the Incremental Uploader to find and delete all of an
    /// object's chunks.
    pub fn prefix_for(namespace: &str, object_ref: &str) -> String {
        format!("{namespace}_{object_ref}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_id_has_no_part_suffix() {
        assert_eq!(Chunk::id_for("object", "Account", 1, 1), "object_Account");
    }

    #[test]
    fn multi_chunk_id_carries_part_number() {
        assert_eq!(Chunk::id_for("object", "Account", 2, 3), "object_Account_part_2");
    }

    #[test]
    fn every_multi_chunk_id_starts_with_the_shared_prefix() {
        let prefix = Chunk::prefix_for("object", "Account");
        for part in 1..=3 {
            assert!(Chunk::id_for("object", "Account", part, 3).starts_with(&prefix));
        }
    }
}
