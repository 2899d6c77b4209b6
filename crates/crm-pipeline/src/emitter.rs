//! Corpus Emitter: renders each completed `ObjectRecord` into
//! a human-readable markdown document and one or more `Chunk`s. Pure — no
//! I/O beyond what the caller chooses to do with the returned values.

use crm_model::{Chunk, ChunkMetadata, ObjectRecord};

/// One object's emitted output: the markdown document plus its chunks,
/// already ordered by `part_index`.
pub struct EmittedObject {
    pub document: String,
    pub chunks: Vec<Chunk>,
}

pub struct CorpusEmitter {
    corpus_namespace: String,
    chunk_char_budget: usize,
}

impl CorpusEmitter {
    pub fn new(corpus_namespace: impl Into<String>, chunk_char_budget: usize) -> Self {
        Self {
            corpus_namespace: corpus_namespace.into(),
            chunk_char_budget: chunk_char_budget.max(1),
        }
    }

    /// Renders `record` into a document and chunks. `record` must already
    /// carry a finalized `content_hash`; every emitted chunk's metadata
    /// carries that same hash, so a downstream hash comparison sees one hash per ref regardless of chunk count.
    pub fn emit(&self, record: &ObjectRecord) -> EmittedObject {
        let document = render_document(record);
        let content_hash = record
            .content_hash
            .clone()
            .unwrap_or_else(|| crm_core::content_hash(&document).to_hex());

        let object_ref = record.object_ref.as_str();
        let sections = split_into_sections(&document, self.chunk_char_budget);
        let total_parts = sections.len().max(1) as u32;

        let ids: Vec<String> = (1..=total_parts)
            .map(|part_index| {
                Chunk::id_for(&self.corpus_namespace, object_ref, part_index, total_parts)
            })
            .collect();

        let chunks = sections
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let part_index = (i + 1) as u32;
                let sibling_ids: Vec<String> = ids
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, id)| id.clone())
                    .collect();
                Chunk {
                    id: ids[i].clone(),
                    text,
                    metadata: ChunkMetadata {
                        object_ref: object_ref.to_string(),
                        type_tag: "object".to_string(),
                        content_hash: content_hash.clone(),
                        total_parts,
                        part_index,
                        sibling_ids,
                    },
                }
            })
            .collect();

        EmittedObject { document, chunks }
    }
}

fn render_document(record: &ObjectRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} ({})\n\n", record.label, record.object_ref));
    if !record.description.is_empty() {
        out.push_str(&record.description);
        out.push_str("\n\n");
    }

    out.push_str("## Fields\n\n");
    out.push_str("| Name | Type | Required | Unique | External ID |\n");
    out.push_str("|---|---|---|---|---|\n");
    for field in &record.fields {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            field.name, field.field_type, field.required, field.unique, field.external_id
        ));
    }
    out.push('\n');

    if !record.relationships.is_empty() {
        out.push_str("## Relationships\n\n");
        for rel in &record.relationships {
            out.push_str(&format!(
                "- {} -> {} ({:?}, cascade_delete={})\n",
                rel.field_name, rel.target_ref, rel.kind, rel.cascade_delete
            ));
        }
        out.push('\n');
    }

    if let Some(automation) = &record.automation {
        out.push_str("## Automation\n\n");
        out.push_str(&format!(
            "Flows: {}. Validation rules: {}. Workflow rules: {}.\n\n",
            automation.flows.len(),
            automation.validation_rules.len(),
            automation.workflow_rules.len()
        ));
        if !automation.triggers.is_empty() {
            out.push_str("Triggers:\n\n");
            for trigger in &automation.triggers {
                out.push_str(&format!(
                    "- {} ({} lines of code, {} comment lines)\n",
                    trigger.name, trigger.complexity.code_lines, trigger.complexity.comment_lines
                ));
            }
            out.push('\n');
        }
    }

    if let Some(security) = &record.security {
        out.push_str("## Security\n\n");
        out.push_str(&format!(
            "{} field permission entries, {} object CRUD entries.\n\n",
            security.field_permissions.len(),
            security.object_crud.len()
        ));
    }

    if let Some(stats) = &record.stats {
        out.push_str("## Statistics\n\n");
        out.push_str(&format!(
            "Record count: {}. Freshness: {:.1}%.\n\n",
            stats.record_count,
            stats.freshness_fraction * 100.0
        ));
        if !stats.top_owning_profiles.is_empty() {
            out.push_str(&format!(
                "Top owning profiles: {}.\n\n",
                stats.top_owning_profiles.join(", ")
            ));
        }
    }

    out
}

/// Splits `text` into chunks of at most `budget` characters, preferring
/// section boundaries (`## ` headings), then paragraph boundaries, then
/// sentence boundaries as a last resort.
fn split_into_sections(text: &str, budget: usize) -> Vec<String> {
    if text.len() <= budget {
        return vec![text.to_string()];
    }

    let sections = split_on(text, "\n## ", true);
    pack(&sections, budget)
}

fn split_on<'a>(text: &'a str, delimiter: &str, reattach_prefix: bool) -> Vec<&'a str> {
    if !text.contains(delimiter) {
        return vec![text];
    }
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find(delimiter) {
        if idx > 0 {
            parts.push(&rest[..idx]);
        }
        let tail_start = if reattach_prefix { idx + 1 } else { idx + delimiter.len() };
        rest = &rest[tail_start..];
    }
    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

/// Greedily packs ordered text units into chunks no larger than `budget`.
/// A unit still over budget on its own is recursively split at the next
/// finer boundary (paragraph, then sentence).
fn pack(units: &[&str], budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for unit in units {
        let piece = if unit.len() > budget {
            split_oversized(unit, budget)
        } else {
            vec![unit.to_string()]
        };

        for part in piece {
            if !current.is_empty() && current.len() + part.len() > budget {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(&part);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

fn split_oversized(unit: &str, budget: usize) -> Vec<String> {
    let paragraphs = split_on(unit, "\n\n", false);
    if paragraphs.len() > 1 {
        return pack(&paragraphs, budget);
    }

    let sentences = split_on(unit, ". ", false);
    if sentences.len() > 1 {
        return pack(&sentences, budget);
    }

    // No structural boundary left; hard-split at the char budget.
    unit.chars()
        .collect::<Vec<char>>()
        .chunks(budget.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
