//! Append-only JSON-lines audit log. One object per decision or
//! execution. An unauditable action must not surface, so write failures
//! escalate instead of degrading.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use std::sync::LazyLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::WallError;

static SENSITIVE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(password|passwd|secret|token|api[_-]?key|authorization|credential)").unwrap()
});
static SENSITIVE_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(bearer\s+\S+|sk-[A-Za-z0-9]{8,})").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Decision,
    Execution,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierOutcome {
    pub tier: String,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub turn_id: Uuid,
    pub user_id: String,
    pub kind: AuditKind,
    pub tool: String,
    /// sha256 over the canonical (unredacted) args JSON.
    pub args_digest: String,
    /// Redacted copy of the args for operator review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wall_tiers: Vec<TierOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_digest: Option<String>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn digest_value(value: &Value) -> String {
    sha256_hex(value.to_string().as_bytes())
}

/// Replace sensitive-looking keys and values before the args copy lands
/// in the log. The digest still covers the original bytes.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if SENSITIVE_KEY.is_match(k) {
                        (k.clone(), Value::String("[redacted]".into()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        Value::String(s) => {
            Value::String(SENSITIVE_VALUE.replace_all(s, "[redacted]").into_owned())
        }
        other => other.clone(),
    }
}

/// All writers funnel through one async mutex, so entries for a given
/// user land in turn order and lines never interleave.
pub struct AuditLog {
    path: PathBuf,
    rotate_bytes: u64,
    writer: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: PathBuf, rotate_bytes: u64) -> Self {
        Self { path, rotate_bytes, writer: Mutex::new(()) }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub async fn append(&self, record: &AuditRecord) -> Result<(), WallError> {
        let line = serde_json::to_string(record)
            .map_err(|e| WallError::AuditFailure(e.to_string()))?;
        let _guard = self.writer.lock().await;

        self.rotate_if_needed()
            .map_err(|e| WallError::AuditFailure(e.to_string()))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| WallError::AuditFailure(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| WallError::AuditFailure(e.to_string()))?;
        file.flush().map_err(|e| WallError::AuditFailure(e.to_string()))?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> std::io::Result<()> {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return Ok(());
        };
        if meta.len() < self.rotate_bytes {
            return Ok(());
        }
        let rotated = self
            .path
            .with_extension(format!("jsonl.{}", Utc::now().format("%Y%m%dT%H%M%S")));
        std::fs::rename(&self.path, rotated)
    }

    /// Administrative rotation, regardless of size.
    pub async fn rotate(&self) -> Result<(), WallError> {
        let _guard = self.writer.lock().await;
        if std::fs::metadata(&self.path).is_err() {
            return Ok(());
        }
        let rotated = self
            .path
            .with_extension(format!("jsonl.{}", Utc::now().format("%Y%m%dT%H%M%S%f")));
        std::fs::rename(&self.path, rotated)
            .map_err(|e| WallError::AuditFailure(e.to_string()))
    }

    /// Parsed entries, oldest first. Test and operator surface.
    pub async fn read_all(&self) -> Result<Vec<AuditRecord>, WallError> {
        let _guard = self.writer.lock().await;
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WallError::AuditFailure(e.to_string())),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(|e| WallError::AuditFailure(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redaction_hides_keys_and_bearer_values() {
        let args = json!({
            "api_key": "sk-abcdef123456",
            "note": "Authorization: Bearer abc.def.ghi",
            "location": "London"
        });
        let clean = redact(&args);
        assert_eq!(clean["api_key"], "[redacted]");
        assert!(clean["note"].as_str().unwrap().contains("[redacted]"));
        assert_eq!(clean["location"], "London");
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"), 1024 * 1024);
        let record = AuditRecord {
            ts: Utc::now(),
            turn_id: Uuid::new_v4(),
            user_id: "u1".into(),
            kind: AuditKind::Decision,
            tool: "get_time".into(),
            args_digest: digest_value(&json!({})),
            args: Some(json!({})),
            wall_tiers: vec![TierOutcome {
                tier: "schema".into(),
                outcome: "pass".into(),
                code: None,
            }],
            decision: Some("approved".into()),
            result_summary: None,
            verdict: None,
            reply_digest: None,
        };
        log.append(&record).await.unwrap();
        let entries = log.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool, "get_time");
        assert_eq!(entries[0].decision.as_deref(), Some("approved"));
    }

    #[tokio::test]
    async fn unwritable_path_escalates() {
        let log = AuditLog::new(PathBuf::from("/nonexistent-dir/audit.jsonl"), 1024);
        let record = AuditRecord {
            ts: Utc::now(),
            turn_id: Uuid::new_v4(),
            user_id: "u1".into(),
            kind: AuditKind::Decision,
            tool: "get_time".into(),
            args_digest: "0".into(),
            args: None,
            wall_tiers: vec![],
            decision: Some("approved".into()),
            result_summary: None,
            verdict: None,
            reply_digest: None,
        };
        assert!(log.append(&record).await.is_err());
    }
}
