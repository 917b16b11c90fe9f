pub mod backend;
pub mod cluster;
pub mod service;
pub mod types;

pub use backend::{InProcessBackend, MemoryBackend};
pub use service::{CommitRequest, MemoryService};
pub use types::{ContextBundle, ForgetTarget, MemoryError, MemoryRecord, UserProfile};
