use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;

use prospera_core::context::{PipelineContext, ScheduleResult, ScheduleStatus, Visit};
use prospera_core::domain::stage::Stage;
use prospera_core::domain::visit::{adjust_visit_date, normalize_visit_date};
use prospera_core::errors::ApplicationError;
use prospera_core::filters::FilterSet;
use prospera_core::text::normalize;
use prospera_db::repositories::ProspectRepository;

use crate::llm::ChatRequest;
use crate::prompts::PromptLibrary;
use crate::structured::{StructuredCompletion, StructuredOutcome};
use crate::subagents::SubAgent;

const BLOCKED_REPLY: &str = "Para coordinar una visita, primero necesito completar tu \
                             calificación. ¿Podemos revisar tus datos de compra?";
const PENDING_REPLY: &str = "¿Podrías indicarme cuándo te gustaría agendar la visita?";
const HEURISTIC_ASK: &str = "¿Qué día te acomoda para coordinar la visita? Puedo ayudarte a \
                             registrarla.";
const DEFAULT_REPLY: &str = "Gracias, revisaré los horarios disponibles y te confirmo en breve.";

#[derive(Debug, Default, Deserialize)]
struct VisitEnvelope {
    #[serde(default, alias = "scheduled_at")]
    date: String,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Default, Deserialize)]
struct ScheduleEnvelope {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    visit: VisitEnvelope,
    #[serde(default)]
    stage: Option<String>,
}

/// Reads: message, history, stage, prospect_id, current_date. Writes:
/// results.schedule, reply_fragments, stage. Persists the visit date.
///
/// Keeps its own stage gate on top of the resolver's: defense in depth for
/// the one transition that commits a human appointment.
pub struct ScheduleAgent {
    completion: StructuredCompletion,
    prompts: Arc<PromptLibrary>,
    prospects: Arc<dyn ProspectRepository>,
    history_window: usize,
}

impl ScheduleAgent {
    pub fn new(
        completion: StructuredCompletion,
        prompts: Arc<PromptLibrary>,
        prospects: Arc<dyn ProspectRepository>,
        history_window: usize,
    ) -> Self {
        Self { completion, prompts, prospects, history_window }
    }

    async fn extract(&self, ctx: &PipelineContext) -> (String, Option<Visit>, Option<Stage>) {
        let mut prompt_context = tera::Context::new();
        prompt_context.insert("current_date", &ctx.current_date.format("%Y-%m-%d").to_string());

        let outcome = match self.prompts.render("schedule", &prompt_context) {
            Some(system) => {
                let request = ChatRequest::new(system, ctx.message.clone())
                    .with_history(ctx.history_window(self.history_window));
                self.completion.request::<ScheduleEnvelope>(request).await
            }
            None => StructuredOutcome::Fallback(crate::structured::FallbackCause::ModelDisabled),
        };

        match outcome {
            StructuredOutcome::Parsed(envelope) => {
                let visit =
                    normalize_visit_date(&envelope.visit.date, ctx.current_date).map(|date| {
                        Visit { date, notes: envelope.visit.notes.trim().to_owned() }
                    });
                let stage = envelope.stage.as_deref().and_then(normalize_stage);
                let reply = envelope
                    .reply
                    .map(|reply| reply.trim().to_owned())
                    .filter(|reply| !reply.is_empty())
                    .unwrap_or_else(|| DEFAULT_REPLY.to_owned());
                (reply, visit, stage)
            }
            StructuredOutcome::Fallback(cause) => {
                tracing::debug!(?cause, "schedule degraded to heuristics");
                heuristic_visit(ctx)
            }
        }
    }
}

#[async_trait]
impl SubAgent for ScheduleAgent {
    fn name(&self) -> &'static str {
        "schedule"
    }

    fn applies(&self, filters: &FilterSet) -> bool {
        filters.schedule
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), ApplicationError> {
        if !matches!(ctx.stage, Stage::Qualified | Stage::Scheduled) {
            let result = ScheduleResult {
                reply: BLOCKED_REPLY.to_owned(),
                visit: None,
                stage: None,
                status: ScheduleStatus::Blocked,
            };
            ctx.push_fragment(result.reply.clone());
            ctx.results.schedule = Some(result);
            return Ok(());
        }

        let Some(prospect) = ctx.prospect_id.clone() else {
            let result = ScheduleResult {
                reply: PENDING_REPLY.to_owned(),
                visit: None,
                stage: None,
                status: ScheduleStatus::Pending,
            };
            ctx.push_fragment(result.reply.clone());
            ctx.results.schedule = Some(result);
            return Ok(());
        };

        let (reply, visit, stage) = self.extract(ctx).await;
        let stage = stage.or(if visit.is_some() { Some(Stage::Scheduled) } else { None });

        let status = match &visit {
            Some(visit) => {
                let target_stage = stage.unwrap_or(Stage::Scheduled);
                match self.prospects.record_visit(&prospect, visit.date, target_stage).await {
                    Ok(()) => ScheduleStatus::Scheduled,
                    Err(error) => {
                        tracing::error!(error = %error, "visit persistence failed");
                        ScheduleStatus::Error
                    }
                }
            }
            None => ScheduleStatus::Pending,
        };

        if let Some(stage) = stage {
            ctx.stage = stage;
        }

        ctx.push_fragment(reply.clone());
        ctx.results.schedule = Some(ScheduleResult { reply, visit, stage, status });
        Ok(())
    }
}

fn normalize_stage(raw: &str) -> Option<Stage> {
    match raw.trim().to_lowercase().parse::<Stage>() {
        Ok(stage @ (Stage::Scheduled | Stage::Qualified | Stage::Conversation)) => Some(stage),
        _ => None,
    }
}

/// Keyword fallback: "mañana" and "próxima semana" are the two offsets the
/// conversation data actually produces; anything else asks for a date.
fn heuristic_visit(ctx: &PipelineContext) -> (String, Option<Visit>, Option<Stage>) {
    let text = normalize(&ctx.message);
    let mut offsets: Vec<i64> = Vec::new();
    if text.contains("manana") {
        offsets.push(1);
    }
    if text.contains("proxima semana") {
        offsets.push(7);
    }

    match offsets.into_iter().min() {
        Some(days) => {
            let date =
                adjust_visit_date(ctx.current_date + Duration::days(days), ctx.current_date);
            let reply = format!(
                "Perfecto, puedo agendar la visita para el {}. ¿Te parece bien?",
                date.format("%Y-%m-%d")
            );
            (reply, Some(Visit { date, notes: String::new() }), Some(Stage::Scheduled))
        }
        None => (HEURISTIC_ASK.to_owned(), None, None),
    }
}
