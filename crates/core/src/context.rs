use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::history::{window, ChatTurn};
use crate::domain::ids::{ProjectId, ProspectId, RealtorId, SessionKey};
use crate::domain::intent::Intent;
use crate::domain::official::OfficialData;
use crate::domain::project::FileType;
use crate::domain::prospect::QualificationVariables;
use crate::domain::stage::Stage;
use crate::effects::SideEffects;
use crate::filters::FilterSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffReason {
    ContactoHumano,
    Desinteres,
    Clasificador,
}

impl HandoffReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffReason::ContactoHumano => "contacto_humano",
            HandoffReason::Desinteres => "desinteres",
            HandoffReason::Clasificador => "clasificador",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Handoff {
    pub reason: HandoffReason,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievedSource {
    pub project_id: ProjectId,
    pub name: String,
    pub score: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalFallback {
    VectorServiceDisabled,
    RagException,
    EmptyResponse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Ok,
    Fallback(RetrievalFallback),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub reply: String,
    pub sources: Vec<RetrievedSource>,
    pub mentioned_properties: Vec<ProjectId>,
    pub status: RetrievalStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestStatus {
    Ok,
    Noop,
    Skipped,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InterestResult {
    pub added: Vec<ProjectId>,
    pub removed: Vec<ProjectId>,
    pub skipped: Vec<ProjectId>,
    pub status: InterestStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationStatus {
    Ok,
    Noop,
    Heuristic,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QualificationResult {
    pub reply: String,
    pub variables: QualificationVariables,
    pub stage: Option<Stage>,
    pub status: QualificationStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Visit {
    pub date: NaiveDate,
    pub notes: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Pending,
    Blocked,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduleResult {
    pub reply: String,
    pub visit: Option<Visit>,
    pub stage: Option<Stage>,
    pub status: ScheduleStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileLink {
    pub project: String,
    pub file_type: FileType,
    pub url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesStatus {
    Ok,
    PendingType,
    PendingProject,
    UnknownProject,
    NotFound,
    MissingInputs,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilesResult {
    pub reply: String,
    pub links: Vec<FileLink>,
    pub status: FilesStatus,
}

/// Typed result slots, one per sub-agent. A fixed struct instead of a
/// name-keyed map: an agent cannot report under an unknown key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubAgentResults {
    pub retrieval: Option<RetrievalResult>,
    pub interest: Option<InterestResult>,
    pub qualification: Option<QualificationResult>,
    pub schedule: Option<ScheduleResult>,
    pub files: Option<FilesResult>,
}

/// Mutable carrier for one pipeline run. Exactly one run owns one context;
/// stages mutate it in place, strictly sequentially.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub session_key: SessionKey,
    pub message: String,
    pub realtor_id: Option<RealtorId>,
    pub prospect_id: Option<ProspectId>,
    pub history: Vec<ChatTurn>,
    pub stage: Stage,
    pub official: OfficialData,
    pub current_date: NaiveDate,

    pub intents: BTreeSet<Intent>,
    pub filters: FilterSet,
    pub results: SubAgentResults,
    /// Candidate reply texts in stable order: classifier reply first, then
    /// sub-agents in execution order, then hand-off messages. The runtime's
    /// call order enforces this; the vector only appends.
    pub reply_fragments: Vec<String>,
    /// Project ids surfaced during this run (retrieval citations merged with
    /// upstream mentions), deduplicated, order preserving. The interest
    /// sub-agent reads this field; that data dependency fixes the execution
    /// order of the pool.
    pub mentioned_properties: Vec<ProjectId>,
    pub side_effects: SideEffects,
    handoff: Option<Handoff>,
    pub automation_allowed: bool,

    pub reply: Option<String>,
    pub split_messages: Vec<String>,
    pub justification: Option<String>,
}

impl PipelineContext {
    pub fn new(
        session_key: SessionKey,
        message: String,
        realtor_id: Option<RealtorId>,
        prospect_id: Option<ProspectId>,
        history: Vec<ChatTurn>,
        stage: Stage,
        official: OfficialData,
        current_date: NaiveDate,
    ) -> Self {
        let mut context = Self {
            session_key,
            message,
            realtor_id,
            prospect_id,
            history,
            stage,
            official,
            current_date,
            intents: BTreeSet::new(),
            filters: FilterSet::default(),
            results: SubAgentResults::default(),
            reply_fragments: Vec::new(),
            mentioned_properties: Vec::new(),
            side_effects: SideEffects::default(),
            handoff: None,
            automation_allowed: true,
            reply: None,
            split_messages: Vec::new(),
            justification: None,
        };
        let upstream: Vec<ProjectId> = context.official.mentioned_properties.clone();
        context.add_mentioned_properties(upstream);
        context
    }

    /// Hand-off is monotonic within a run: once requested it can never be
    /// cleared. The first reason wins, with one exception: an explicit
    /// opt-out upgrades any non-opt-out reason, because opt-out must win the
    /// broker-assignment exclusion.
    pub fn request_handoff(&mut self, reason: HandoffReason) {
        match self.handoff {
            None => self.handoff = Some(Handoff { reason }),
            Some(current)
                if reason == HandoffReason::Desinteres
                    && current.reason != HandoffReason::Desinteres =>
            {
                self.handoff = Some(Handoff { reason });
            }
            Some(_) => {}
        }
    }

    pub fn handoff(&self) -> Option<Handoff> {
        self.handoff
    }

    pub fn is_handoff(&self) -> bool {
        self.handoff.is_some()
    }

    pub fn push_fragment(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.trim().is_empty() {
            self.reply_fragments.push(fragment);
        }
    }

    pub fn add_mentioned_properties(&mut self, ids: impl IntoIterator<Item = ProjectId>) {
        for id in ids {
            if !self.mentioned_properties.contains(&id) {
                self.mentioned_properties.push(id);
            }
        }
    }

    pub fn history_window(&self, limit: usize) -> &[ChatTurn] {
        window(&self.history, limit)
    }
}
