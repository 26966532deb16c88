use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;

use prospera_core::config::AppConfig;
use prospera_core::context::{HandoffReason, PipelineContext};
use prospera_core::domain::history::{window, ChatTurn};
use prospera_core::domain::ids::{ProspectId, RealtorId, SessionKey};
use prospera_core::domain::official::OfficialData;
use prospera_core::domain::stage::Stage;
use prospera_core::effects::NotificationPayload;
use prospera_core::errors::{ApplicationError, DomainError};
use prospera_core::filters::FilterSet;
use prospera_db::repositories::{
    BrokerRepository, ChatHistoryRepository, FollowupRepository, InterestRepository,
    ProjectFilesRepository, ProjectRepository, ProspectRepository,
};

use crate::classifier::IntentClassifier;
use crate::collector::SideEffectCollector;
use crate::compose::CompositionChain;
use crate::llm::LlmClient;
use crate::prompts::PromptLibrary;
use crate::structured::StructuredCompletion;
use crate::subagents::{
    FilesAgent, HandoffAgent, InterestAgent, QualificationAgent, RetrievalAgent, ScheduleAgent,
    SubAgent,
};
use crate::vector::VectorSearch;

/// Repository handles the pipeline persists through.
#[derive(Clone)]
pub struct Stores {
    pub prospects: Arc<dyn ProspectRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub interests: Arc<dyn InterestRepository>,
    pub files: Arc<dyn ProjectFilesRepository>,
    pub followups: Arc<dyn FollowupRepository>,
    pub brokers: Arc<dyn BrokerRepository>,
    pub history: Arc<dyn ChatHistoryRepository>,
}

/// Normalized inbound payload, as produced by the upstream HTTP layer.
#[derive(Clone, Debug, Default)]
pub struct InboundMessage {
    pub message: String,
    pub realtor_id: Option<RealtorId>,
    pub prospect_id: Option<ProspectId>,
    pub session_key: Option<SessionKey>,
    pub telephone: Option<String>,
    pub stage: Option<Stage>,
    pub history: Vec<ChatTurn>,
    pub official: OfficialData,
}

/// Final pipeline result handed to the delivery layer.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub reply: String,
    pub intents: Vec<String>,
    pub filters: BTreeMap<String, bool>,
    pub handoff: bool,
    pub handoff_reason: Option<String>,
    /// False once the prospect opted out; the delivery layer must stop
    /// automated follow-ups for this conversation.
    pub automation_allowed: bool,
    pub split_messages: Vec<String>,
    pub notifications: Vec<NotificationPayload>,
    pub justification: Option<String>,
}

/// Per-session advisory locks: two concurrent runs for the same
/// conversation serialize, so qualification/interest merges cannot
/// interleave. Runs for different sessions never contend.
#[derive(Default)]
struct SessionLocks {
    inner: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    fn acquire(&self, key: &SessionKey) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.inner.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(key.as_str().to_owned()).or_default().clone()
    }
}

/// The orchestrator: one inbound message, one strictly sequential run of
/// classifier → resolver → sub-agents → collector → composition chain.
pub struct PipelineRuntime {
    classifier: IntentClassifier,
    prompts: Arc<PromptLibrary>,
    pool: Vec<Box<dyn SubAgent>>,
    collector: SideEffectCollector,
    chain: CompositionChain,
    history: Arc<dyn ChatHistoryRepository>,
    locks: SessionLocks,
    history_window: usize,
    generic_reply: String,
}

impl PipelineRuntime {
    pub fn new(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        vector: Arc<dyn VectorSearch>,
        stores: Stores,
    ) -> Result<Self, ApplicationError> {
        let prompts = Arc::new(PromptLibrary::new()?);
        let completion =
            StructuredCompletion::new(llm, Duration::from_secs(config.llm.timeout_secs));
        let pipeline = &config.pipeline;

        // Fixed execution order. Retrieval must precede interest tracking:
        // interest reads the mentioned-property ids retrieval merges into
        // the context.
        let pool: Vec<Box<dyn SubAgent>> = vec![
            Box::new(RetrievalAgent::new(
                vector,
                completion.clone(),
                prompts.clone(),
                pipeline.rag_failure_reply.clone(),
                pipeline.history_window,
            )),
            Box::new(InterestAgent::new(stores.projects.clone(), stores.interests.clone())),
            Box::new(QualificationAgent::new(
                completion.clone(),
                prompts.clone(),
                stores.prospects.clone(),
                pipeline.history_window,
            )),
            Box::new(ScheduleAgent::new(
                completion.clone(),
                prompts.clone(),
                stores.prospects.clone(),
                pipeline.history_window,
            )),
            Box::new(FilesAgent::new(
                completion.clone(),
                prompts.clone(),
                stores.projects.clone(),
                stores.files.clone(),
                pipeline.history_window,
            )),
            Box::new(HandoffAgent),
        ];

        Ok(Self {
            classifier: IntentClassifier::new(completion.clone()),
            prompts: prompts.clone(),
            pool,
            collector: SideEffectCollector::new(
                stores.prospects.clone(),
                stores.brokers.clone(),
                stores.followups.clone(),
            ),
            chain: CompositionChain::new(
                completion,
                prompts,
                pipeline.max_segment_chars,
                pipeline.response_history_window,
                pipeline.generic_reply.clone(),
            ),
            history: stores.history,
            locks: SessionLocks::default(),
            history_window: pipeline.history_window,
            generic_reply: pipeline.generic_reply.clone(),
        })
    }

    pub async fn handle(&self, inbound: InboundMessage) -> Result<PipelineOutput, ApplicationError> {
        let message = inbound.message.trim().to_owned();
        if message.is_empty() {
            // Empty messages are rejected upstream; reaching here is a
            // caller bug, not a degradation case.
            return Err(DomainError::InvariantViolation(
                "inbound message must not be empty".to_owned(),
            )
            .into());
        }

        let session_key = resolve_session_key(&inbound);
        let lock = self.locks.acquire(&session_key);
        let _guard = lock.lock().await;

        let history = if inbound.history.is_empty() {
            match self.history.recent(&session_key, self.history_window).await {
                Ok(history) => history,
                Err(error) => {
                    tracing::warn!(error = %error, "history lookup failed; starting cold");
                    Vec::new()
                }
            }
        } else {
            window(&inbound.history, self.history_window).to_vec()
        };

        let stage = inbound
            .stage
            .or_else(|| inbound.official.prospect.as_ref().and_then(|snapshot| snapshot.stage))
            .unwrap_or(Stage::NewProspect);

        let mut ctx = PipelineContext::new(
            session_key.clone(),
            message,
            inbound.realtor_id,
            inbound.prospect_id,
            history,
            stage,
            inbound.official,
            Utc::now().date_naive(),
        );

        let classified =
            self.classifier.classify(&self.prompts, &ctx.message, &ctx.history, &ctx.official).await;
        ctx.intents = classified.intents;
        if let Some(reply) = classified.reply {
            ctx.push_fragment(reply);
        }
        if classified.handoff {
            ctx.request_handoff(HandoffReason::Clasificador);
        }

        ctx.filters = FilterSet::resolve(&ctx.intents, ctx.stage);
        tracing::info!(
            session = session_key.as_str(),
            intents = ?ctx.intents,
            stage = %ctx.stage,
            "intents classified"
        );

        for agent in &self.pool {
            if agent.applies(&ctx.filters) {
                if let Err(error) = agent.run(&mut ctx).await {
                    tracing::error!(
                        agent = agent.name(),
                        error = %error,
                        "sub-agent failed; pipeline continues"
                    );
                }
            }
        }

        self.collector.run(&mut ctx, Utc::now()).await;
        self.chain.run(&mut ctx).await;

        let reply = final_reply(&ctx, &self.generic_reply);

        if let Err(error) =
            self.history.append(&session_key, &ChatTurn::user(ctx.message.as_str())).await
        {
            tracing::warn!(error = %error, "could not persist user turn");
        }
        if let Err(error) =
            self.history.append(&session_key, &ChatTurn::assistant(reply.as_str())).await
        {
            tracing::warn!(error = %error, "could not persist assistant turn");
        }

        Ok(PipelineOutput {
            reply,
            intents: ctx.intents.iter().map(|intent| intent.as_str().to_owned()).collect(),
            filters: ctx
                .filters
                .as_pairs()
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
            handoff: ctx.is_handoff(),
            handoff_reason: ctx.handoff().map(|handoff| handoff.reason.as_str().to_owned()),
            automation_allowed: ctx.automation_allowed,
            split_messages: ctx.split_messages.clone(),
            notifications: ctx.side_effects.notifications.clone(),
            justification: ctx.justification.clone(),
        })
    }
}

fn resolve_session_key(inbound: &InboundMessage) -> SessionKey {
    if let Some(key) = inbound.session_key.clone() {
        return key;
    }
    if let (Some(telephone), Some(realtor)) = (&inbound.telephone, &inbound.realtor_id) {
        if let Some(key) = SessionKey::from_parts(telephone, realtor) {
            return key;
        }
    }
    SessionKey::anonymous()
}

/// First non-empty split segment, else the composed reply, else the joined
/// fragments, else the generic processing reply.
fn final_reply(ctx: &PipelineContext, generic_reply: &str) -> String {
    if let Some(segment) =
        ctx.split_messages.iter().map(|segment| segment.trim()).find(|s| !s.is_empty())
    {
        return segment.to_owned();
    }
    if let Some(reply) = ctx.reply.as_deref() {
        if !reply.trim().is_empty() {
            return reply.trim().to_owned();
        }
    }
    if !ctx.reply_fragments.is_empty() {
        return ctx.reply_fragments.join(" ");
    }
    generic_reply.to_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use prospera_core::domain::ids::{RealtorId, SessionKey};

    use super::{resolve_session_key, InboundMessage, SessionLocks};

    #[test]
    fn session_locks_reuse_the_same_lock_per_key() {
        let locks = SessionLocks::default();
        let key_a = SessionKey("569:r-1".to_owned());
        let key_b = SessionKey("570:r-1".to_owned());

        let first = locks.acquire(&key_a);
        let second = locks.acquire(&key_a);
        let other = locks.acquire(&key_b);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn session_key_prefers_explicit_then_composite_then_anonymous() {
        let explicit = InboundMessage {
            session_key: Some(SessionKey("given".to_owned())),
            ..InboundMessage::default()
        };
        assert_eq!(resolve_session_key(&explicit).as_str(), "given");

        let composite = InboundMessage {
            telephone: Some("+56911112222@s.whatsapp.net".to_owned()),
            realtor_id: Some(RealtorId("r-1".to_owned())),
            ..InboundMessage::default()
        };
        assert_eq!(resolve_session_key(&composite).as_str(), "56911112222:r-1");

        assert_eq!(resolve_session_key(&InboundMessage::default()).as_str(), "anonymous");
    }
}
