//! Language vocabulary: the keyword tables the scanner and rules consult.
//!
//! Every field has a default, so a partial JSON or TOML table deserializes
//! into a complete vocabulary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Vocabulary {
    /// Keys that open a Section frame when they appear alone on a line.
    pub section_keywords: Vec<String>,
    /// Sections whose named sequence items are actions rather than blocks.
    pub action_sections: Vec<String>,
    /// Recognized values for a block's `kind`.
    pub block_kinds: Vec<String>,
    /// Fields that make an action executable.
    pub executable_directives: Vec<String>,
    /// Fields holding a versioned artifact reference.
    pub version_fields: Vec<String>,
    /// Top-level fields the snapshot rules require.
    pub required_fields: Vec<String>,
    /// Top-level fields still checked when no snapshot is available.
    pub fallback_required_fields: Vec<String>,
    /// Tags that mean "whatever is newest".
    pub floating_tags: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            section_keywords: strings(&[
                "blocks",
                "config",
                "actions",
                "inputs",
                "outputs",
                "env",
                "depends_on",
            ]),
            action_sections: strings(&["actions"]),
            block_kinds: strings(&[
                "terraform",
                "helm",
                "kubernetes",
                "docker",
                "script",
                "ansible",
                "pulumi",
            ]),
            executable_directives: strings(&["run", "script", "command"]),
            version_fields: strings(&["from"]),
            required_fields: strings(&["name", "kind"]),
            fallback_required_fields: strings(&["name"]),
            floating_tags: strings(&["latest"]),
        }
    }
}

impl Vocabulary {
    pub fn is_section_keyword(&self, key: &str) -> bool {
        self.section_keywords.iter().any(|k| k == key)
    }

    pub fn is_action_section(&self, key: &str) -> bool {
        self.action_sections.iter().any(|k| k == key)
    }

    pub fn is_block_kind(&self, kind: &str) -> bool {
        self.block_kinds.iter().any(|k| k == kind)
    }

    pub fn is_version_field(&self, field: &str) -> bool {
        self.version_fields.iter().any(|k| k == field)
    }

    pub fn is_floating_tag(&self, tag: &str) -> bool {
        self.floating_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
