//! Sub-agent pool: one independent unit per capability filter.
//!
//! Every agent reads from the shared [`PipelineContext`], may call the model
//! and/or a repository, and writes its typed result plus a candidate reply
//! fragment back. The runtime invokes them in a fixed order; the one real
//! data dependency is that the interest agent reads the mentioned-property
//! ids the retrieval agent merged into the context.

use async_trait::async_trait;

use prospera_core::context::PipelineContext;
use prospera_core::errors::ApplicationError;
use prospera_core::filters::FilterSet;

pub mod files;
pub mod handoff;
pub mod interest;
pub mod qualification;
pub mod retrieval;
pub mod schedule;

pub use files::FilesAgent;
pub use handoff::HandoffAgent;
pub use interest::{InterestAction, InterestAgent};
pub use qualification::QualificationAgent;
pub use retrieval::RetrievalAgent;
pub use schedule::ScheduleAgent;

#[async_trait]
pub trait SubAgent: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this agent's capability filter is active. An agent never
    /// flips its own filter.
    fn applies(&self, filters: &FilterSet) -> bool;

    /// Errors returned here are logged by the runtime and never abort the
    /// run; agents are expected to degrade internally and reserve `Err` for
    /// genuinely unexpected states.
    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), ApplicationError>;
}
