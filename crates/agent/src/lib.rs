//! Pipeline runtime - intent routing and the multi-stage agent pool
//!
//! This crate is the "brain" of the prospera system: one inbound WhatsApp
//! message enters, one reply plus side-effect directives leave.
//!
//! # Architecture
//!
//! The runtime follows a fixed, strictly sequential pipeline:
//! 1. **Intent Classification** (`classifier`) - LLM-first, keyword fallback
//! 2. **Filter Resolution** (`prospera_core::filters`) - pure (intents, stage) table
//! 3. **Sub-Agent Pool** (`subagents`) - retrieval, interest, qualification,
//!    scheduling, files, hand-off; each gated by its filter
//! 4. **Side-Effect Collection** (`collector`) - broker assignment,
//!    follow-up rescheduling, notifications
//! 5. **Response Composition** (`compose`) - composer → tone rewriter →
//!    splitter → escalation note, each independently degradable
//!
//! # Key Types
//!
//! - `PipelineRuntime` - the orchestrator (see `runtime` module)
//! - `LlmClient` - pluggable completion seam; the network transport is the
//!   host's concern
//! - `StructuredCompletion` - the one shared "LLM JSON or fallback" helper
//!
//! # Degradation Principle
//!
//! No stage ever raises out of the pipeline. Every LLM, vector-search and
//! persistence boundary is a catch-and-degrade point; the reply produced so
//! far is always what gets returned.

pub mod classifier;
pub mod collector;
pub mod compose;
pub mod llm;
pub mod logging;
pub mod prompts;
pub mod runtime;
pub mod structured;
pub mod subagents;
pub mod vector;

pub use classifier::{ClassifierOutput, IntentClassifier};
pub use llm::{ChatRequest, DisabledLlm, LlmClient, LlmError, ScriptedLlm};
pub use logging::init_logging;
pub use runtime::{InboundMessage, PipelineOutput, PipelineRuntime, Stores};
pub use structured::{FallbackCause, StructuredCompletion, StructuredOutcome};
pub use vector::{HttpVectorSearch, StaticVectorSearch, VectorHit, VectorSearch, VectorSearchError};
