use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::kernel::cancel::CancelHandle;
use crate::memory::MemoryService;
use crate::registry::Capability;
use crate::services::llm::LanguageModel;
use crate::verifier::citations::CitationStore;

use super::tools::research::Document;
use super::ExecError;

/// Shared collaborators tools may reach, independent of any single turn.
#[derive(Clone)]
pub struct ToolDeps {
    pub memory: Option<Arc<MemoryService>>,
    pub citations: Arc<dyn CitationStore>,
    pub model: Option<Arc<dyn LanguageModel>>,
    /// Retrieval corpus backing search/research in this deployment.
    pub corpus: Arc<Vec<Document>>,
    /// Filesystem confinement root for file tools.
    pub fs_root: PathBuf,
}

/// Everything a handler gets for one run: cancellation, deadline, a
/// private scratch directory, and exactly the capabilities the tool's
/// side-effect descriptor grants.
#[derive(Clone)]
pub struct ExecutionContext {
    pub user_id: String,
    pub cancel: CancelHandle,
    pub deadline: tokio::time::Instant,
    pub scratch: PathBuf,
    pub caps: HashSet<Capability>,
    pub max_output_bytes: usize,
    pub deps: ToolDeps,
}

impl ExecutionContext {
    /// Gate for capability use. Tools call this before acting; anything
    /// outside the granted set fails the run.
    pub fn require(&self, cap: Capability) -> Result<(), ExecError> {
        if self.caps.contains(&cap) {
            Ok(())
        } else {
            Err(ExecError::CapabilityDenied(cap))
        }
    }

    /// Confine a path argument under the deployment root.
    pub fn resolve_path(&self, raw: &str) -> Result<PathBuf, ExecError> {
        crate::wall::policy::resolve_under_root(&self.deps.fs_root, raw)
            .map_err(|_| ExecError::PathOutsideRoot(raw.to_string()))
    }

    pub fn memory(&self) -> Result<&Arc<MemoryService>, ExecError> {
        self.deps
            .memory
            .as_ref()
            .ok_or_else(|| ExecError::ToolInternal("memory service not wired".into()))
    }
}
