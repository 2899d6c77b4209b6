//! Writes the filesystem layout under `output_dir`: a `schema.json`
//! working-set snapshot, one markdown document per object, the chunk
//! corpus as JSONL, and the org-wide security model.

use std::path::Path;

use crm_model::{Chunk, ObjectRecord, OrgSecurityModel};

/// Writes `schema.json`: the full working set of [`ObjectRecord`]s as a
/// single JSON array, pretty-printed so it's diffable between runs.
pub async fn write_schema(output_dir: &Path, records: &[ObjectRecord]) -> std::io::Result<()> {
    let encoded = to_json_io(serde_json::to_vec_pretty(records))?;
    tokio::fs::write(output_dir.join("schema.json"), encoded).await
}

/// Writes one markdown file per object under `output_dir/documents/`,
/// named after the object's ref.
pub async fn write_documents(output_dir: &Path, documents: &[(String, String)]) -> std::io::Result<()> {
    let dir = output_dir.join("documents");
    tokio::fs::create_dir_all(&dir).await?;
    for (object_ref, document) in documents {
        tokio::fs::write(dir.join(format!("{object_ref}.md")), document.as_bytes()).await?;
    }
    Ok(())
}

/// Writes `corpus.jsonl`: one `{id, text, metadata}` line per chunk, in
/// the order the chunks are already sorted in.
pub async fn write_corpus_jsonl(output_dir: &Path, chunks: &[Chunk]) -> std::io::Result<()> {
    let mut body = Vec::new();
    for chunk in chunks {
        body.extend(to_json_io(serde_json::to_vec(chunk))?);
        body.push(b'\n');
    }
    tokio::fs::write(output_dir.join("corpus.jsonl"), body).await
}

/// Writes `security.json`: the org-wide profiles/permission sets/roles
/// model fetched once per run by the Org Security Enricher.
pub async fn write_security(output_dir: &Path, model: &OrgSecurityModel) -> std::io::Result<()> {
    let encoded = to_json_io(serde_json::to_vec_pretty(model))?;
    tokio::fs::write(output_dir.join("security.json"), encoded).await
}

fn to_json_io<T>(result: serde_json::Result<T>) -> std::io::Result<T> {
    result.map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}
