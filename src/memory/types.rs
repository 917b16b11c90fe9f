use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One committed experience. Records are immutable after commit; "forget"
/// removes whole records and never rewrites ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub utterance: String,
    pub reply: String,
    pub tool_name: String,
    pub success: bool,
    /// Opaque vector handle; the service only compares by cosine.
    pub embedding: Vec<f32>,
    pub cluster_id: Option<u32>,
    /// In [0, 1]. Drives budget trimming and pruning.
    pub importance: f32,
}

/// Per-user aggregate derived from committed records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    /// Dominant themes as (cluster label, record count), most common first.
    pub themes: Vec<(String, usize)>,
    /// (tool name, use count), most used first.
    pub tool_histogram: Vec<(String, usize)>,
    pub success_rate: f32,
    pub total_turns: usize,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn render(&self) -> String {
        let themes = self
            .themes
            .iter()
            .take(3)
            .map(|(label, n)| format!("{label} ({n})"))
            .collect::<Vec<_>>()
            .join(", ");
        let tools = self
            .tool_histogram
            .iter()
            .take(3)
            .map(|(tool, n)| format!("{tool} x{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "profile: {} turns, {:.0}% success; themes: [{}]; tools: [{}]",
            self.total_turns,
            self.success_rate * 100.0,
            themes,
            tools
        )
    }
}

/// Top record of a cluster represented in the selection, used to surface
/// a theme to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeExemplar {
    pub label: String,
    pub record: MemoryRecord,
}

/// What `assemble_context` hands the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Newest first.
    pub recent: Vec<MemoryRecord>,
    /// Semantic hits above the similarity floor, best first.
    pub semantic: Vec<(MemoryRecord, f32)>,
    pub exemplars: Vec<ThemeExemplar>,
    pub profile: UserProfile,
    /// Set when the vector backend failed and only recent turns are here.
    pub degraded: bool,
}

impl ContextBundle {
    pub fn empty(user_id: &str) -> Self {
        Self {
            recent: Vec::new(),
            semantic: Vec::new(),
            exemplars: Vec::new(),
            profile: UserProfile {
                user_id: user_id.to_string(),
                ..UserProfile::default()
            },
            degraded: false,
        }
    }

    /// Textual rendering handed to the model strategy. The character
    /// budget in the config applies to this string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.profile.render());
        out.push('\n');
        for ex in &self.exemplars {
            out.push_str(&format!(
                "theme[{}]: {} -> {}\n",
                ex.label, ex.record.utterance, ex.record.reply
            ));
        }
        for (rec, sim) in &self.semantic {
            out.push_str(&format!(
                "related({sim:.2}): {} -> {}\n",
                rec.utterance, rec.reply
            ));
        }
        for rec in self.recent.iter().rev() {
            out.push_str(&format!("turn: {} -> {}\n", rec.utterance, rec.reply));
        }
        out
    }

    pub fn rendered_len(&self) -> usize {
        self.render().len()
    }
}

/// Target selector for `forget`.
#[derive(Debug, Clone)]
pub enum ForgetTarget {
    Id(Uuid),
    Query(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("record not found")]
    NotFound,
}
