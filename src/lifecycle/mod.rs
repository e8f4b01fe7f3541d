//! Pool lifecycle: tier planning, resync waiting, and operation sequencing

pub mod orchestrator;
pub mod resync;
pub mod tiering;

pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use resync::WaitPolicy;
pub use tiering::{plan, Tier, TierPlan};
