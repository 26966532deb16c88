use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use prospera_core::context::{PipelineContext, QualificationResult, QualificationStatus};
use prospera_core::domain::prospect::QualificationVariables;
use prospera_core::domain::qualification::auto_stage;
use prospera_core::domain::stage::Stage;
use prospera_core::errors::ApplicationError;
use prospera_core::filters::FilterSet;
use prospera_core::text::normalize;
use prospera_db::repositories::ProspectRepository;

use crate::classifier::context_block;
use crate::llm::ChatRequest;
use crate::prompts::PromptLibrary;
use crate::structured::{StructuredCompletion, StructuredOutcome};
use crate::subagents::SubAgent;

const HEURISTIC_REPLY: &str = "Gracias por compartir tus planes de compra. Un asesor revisará \
                               tus datos de financiamiento para ayudarte con la calificación.";
const DEFAULT_REPLY: &str = "Gracias por la información. La compartiré con un asesor.";

#[derive(Debug, Default, Deserialize)]
struct QualificationEnvelope {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    calification: QualificationVariables,
    #[serde(default)]
    stage: Option<String>,
}

/// Reads: message, history, stage, official realtor block, prospect_id.
/// Writes: results.qualification, reply_fragments, stage. Persists the
/// merged qualification variables.
pub struct QualificationAgent {
    completion: StructuredCompletion,
    prompts: Arc<PromptLibrary>,
    prospects: Arc<dyn ProspectRepository>,
    history_window: usize,
}

impl QualificationAgent {
    pub fn new(
        completion: StructuredCompletion,
        prompts: Arc<PromptLibrary>,
        prospects: Arc<dyn ProspectRepository>,
        history_window: usize,
    ) -> Self {
        Self { completion, prompts, prospects, history_window }
    }

    async fn extract(&self, ctx: &PipelineContext) -> (String, QualificationVariables, Option<Stage>, QualificationStatus) {
        let outcome = match self.prompts.render("qualification", &tera::Context::new()) {
            Some(system) => {
                let mut request = ChatRequest::new(system, ctx.message.clone())
                    .with_history(ctx.history_window(self.history_window));
                if let Some(block) = context_block(&ctx.official) {
                    request = request.with_system(block);
                }
                request =
                    request.with_system(format!("Stage actual del prospecto: {}", ctx.stage));
                self.completion.request::<QualificationEnvelope>(request).await
            }
            None => StructuredOutcome::Fallback(crate::structured::FallbackCause::ModelDisabled),
        };

        match outcome {
            StructuredOutcome::Parsed(envelope) => {
                let variables = envelope.calification.trimmed();
                let stage = envelope.stage.as_deref().and_then(normalize_stage);
                let reply = envelope
                    .reply
                    .map(|reply| reply.trim().to_owned())
                    .filter(|reply| !reply.is_empty())
                    .unwrap_or_else(|| DEFAULT_REPLY.to_owned());
                (reply, variables, stage, QualificationStatus::Ok)
            }
            StructuredOutcome::Fallback(cause) => {
                tracing::debug!(?cause, "qualification degraded to heuristics");
                let variables = heuristic_variables(&ctx.message);
                (HEURISTIC_REPLY.to_owned(), variables, None, QualificationStatus::Heuristic)
            }
        }
    }
}

#[async_trait]
impl SubAgent for QualificationAgent {
    fn name(&self) -> &'static str {
        "qualification"
    }

    fn applies(&self, filters: &FilterSet) -> bool {
        filters.calification
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), ApplicationError> {
        let Some(prospect) = ctx.prospect_id.clone() else {
            tracing::warn!(
                session = ctx.session_key.as_str(),
                "qualification skipped: no prospect id"
            );
            return Ok(());
        };

        let (reply, variables, mut stage, mut status) = self.extract(ctx).await;

        if stage.is_none() {
            stage = auto_stage(&variables, ctx.current_date);
        }

        if variables.is_empty() {
            if status == QualificationStatus::Ok {
                status = QualificationStatus::Noop;
            }
        } else {
            match self.prospects.merge_qualification(&prospect, &variables, stage).await {
                Ok(()) => status = QualificationStatus::Ok,
                Err(error) => {
                    tracing::error!(error = %error, "qualification merge failed");
                    status = QualificationStatus::Error;
                }
            }
        }

        if let Some(stage) = stage {
            ctx.stage = stage;
        }

        ctx.push_fragment(reply.clone());
        ctx.results.qualification =
            Some(QualificationResult { reply, variables, stage, status });
        Ok(())
    }
}

fn normalize_stage(raw: &str) -> Option<Stage> {
    match raw.trim().to_lowercase().parse::<Stage>() {
        Ok(stage @ (Stage::Qualified | Stage::Conversation | Stage::NotQualified)) => Some(stage),
        _ => None,
    }
}

fn heuristic_variables(message: &str) -> QualificationVariables {
    let text = normalize(message);
    let mut variables = QualificationVariables::default();
    if ["contado", "efectivo", "transferencia", "vale vista"]
        .iter()
        .any(|keyword| text.contains(keyword))
    {
        variables.forma_pago = "contado".to_owned();
    }
    if text.contains("credito") {
        variables.forma_pago = "credito_consumo".to_owned();
    }
    variables
}
