use serde::{Deserialize, Serialize};

/// Lines-of-code breakdown for a trigger or class body, computed locally
/// from fetched source text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeComplexity {
    pub total_lines: u32,
    pub comment_lines: u32,
    pub code_lines: u32,
}

impl CodeComplexity {
    /// Counts lines in `source`, treating a line whose trimmed text starts
    /// with `//` or `/*` as a comment line. Blank lines count toward
    /// `total_lines` but not `code_lines`.
    pub fn from_source(source: &str) -> Self {
        let mut total = 0u32;
        let mut comment = 0u32;
        let mut code = 0u32;
        for line in source.lines() {
            total += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*') {
                comment += 1;
            } else {
                code += 1;
            }
        }
        Self {
            total_lines: total,
            comment_lines: comment,
            code_lines: code,
        }
    }
}

/// A flow, validation rule, or workflow rule that references the object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An Apex-style trigger on the object, with its code complexity stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRef {
    pub name: String,
    pub complexity: CodeComplexity,
}

/// Automation artifacts referencing the object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationBlock {
    pub flows: Vec<AutomationRef>,
    pub triggers: Vec<TriggerRef>,
    pub validation_rules: Vec<AutomationRef>,
    pub workflow_rules: Vec<AutomationRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_complexity_counts_comment_and_code_lines() {
        let source = "// header\nint x = 1;\n\nif (x) {\n  // inline\n  doThing();\n}\n";
        let complexity = CodeComplexity::from_source(source);
        assert_eq!(complexity.total_lines, 7);
        assert_eq!(complexity.comment_lines, 2);
        assert_eq!(complexity.code_lines, 4);
    }
}
