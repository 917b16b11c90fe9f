pub mod cancel;
pub mod orchestrator;
pub mod turn;

pub use cancel::CancelHandle;
pub use orchestrator::{Pipeline, PipelineError};
pub use turn::{Turn, TurnOutcome};
