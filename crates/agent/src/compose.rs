use std::sync::Arc;

use serde::Deserialize;

use prospera_core::context::{HandoffReason, PipelineContext, RetrievalStatus};
use prospera_core::domain::stage::Stage;
use prospera_core::text::{chunk_message, enforce_limit};

use crate::llm::ChatRequest;
use crate::prompts::PromptLibrary;
use crate::structured::{StructuredCompletion, StructuredOutcome};

#[derive(Debug, Default, Deserialize)]
struct SplitterEnvelope {
    #[serde(default)]
    messages: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EscalationEnvelope {
    #[serde(default)]
    requires_justification: bool,
    #[serde(default)]
    justification: String,
}

/// Fixed post-processing chain: Composer → Tone Rewriter → Splitter →
/// Escalation Note. Each stage degrades independently; a failure never
/// discards the work of the stages before it.
pub struct CompositionChain {
    completion: StructuredCompletion,
    prompts: Arc<PromptLibrary>,
    max_segment_chars: usize,
    response_history_window: usize,
    generic_reply: String,
}

impl CompositionChain {
    pub fn new(
        completion: StructuredCompletion,
        prompts: Arc<PromptLibrary>,
        max_segment_chars: usize,
        response_history_window: usize,
        generic_reply: String,
    ) -> Self {
        Self { completion, prompts, max_segment_chars, response_history_window, generic_reply }
    }

    pub async fn run(&self, ctx: &mut PipelineContext) {
        self.compose(ctx).await;
        self.rewrite_tone(ctx).await;
        self.split(ctx).await;
        self.escalation_note(ctx).await;
    }

    async fn compose(&self, ctx: &mut PipelineContext) {
        let official = &ctx.official;
        let mut prompt_context = tera::Context::new();
        prompt_context.insert(
            "bot_name",
            official.bot.name.as_deref().unwrap_or("el asistente virtual"),
        );
        prompt_context.insert(
            "realtor_name",
            official.realtor.name.as_deref().unwrap_or("la inmobiliaria"),
        );
        prompt_context.insert(
            "bot_personality",
            official.bot.personality.as_deref().unwrap_or("profesional y cordial"),
        );
        prompt_context.insert("bot_tone", official.bot.tone.as_deref().unwrap_or("cálido"));
        prompt_context.insert("stage_instruction", stage_instruction(ctx.stage));
        prompt_context.insert("additional_info", &aggregated_info(ctx));

        let composed = match self.prompts.render("composer", &prompt_context) {
            Some(system) => {
                let request = ChatRequest::new(system, ctx.message.clone())
                    .with_history(ctx.history_window(self.response_history_window));
                self.completion.text(request).await
            }
            None => None,
        };

        ctx.reply = Some(match composed {
            Some(reply) => reply,
            None => {
                tracing::debug!("composer degraded to fragment join");
                if ctx.reply_fragments.is_empty() {
                    self.generic_reply.clone()
                } else {
                    ctx.reply_fragments.join(" ")
                }
            }
        });
    }

    async fn rewrite_tone(&self, ctx: &mut PipelineContext) {
        let Some(base_reply) = ctx.reply.clone() else {
            return;
        };

        let mut prompt_context = tera::Context::new();
        prompt_context.insert("user_message", &ctx.message);
        prompt_context.insert("base_reply", &base_reply);

        let rewritten = match self.prompts.render("tone", &prompt_context) {
            Some(system) => {
                self.completion.text(ChatRequest::new(system, "Reescribe la respuesta.")).await
            }
            None => None,
        };

        if let Some(rewritten) = rewritten {
            ctx.reply = Some(rewritten);
        }
    }

    async fn split(&self, ctx: &mut PipelineContext) {
        let combined = combined_reply(ctx);
        if combined.is_empty() {
            return;
        }

        let mut prompt_context = tera::Context::new();
        prompt_context.insert("user_message", &ctx.message);
        prompt_context.insert("reply", &combined);
        prompt_context.insert("max_chars", &self.max_segment_chars);

        let proposed = match self.prompts.render("splitter", &prompt_context) {
            Some(system) => self
                .completion
                .request::<SplitterEnvelope>(ChatRequest::new(
                    system,
                    "Genera los mensajes segmentados.",
                ))
                .await,
            None => StructuredOutcome::Fallback(crate::structured::FallbackCause::ModelDisabled),
        };

        let segments = match proposed {
            StructuredOutcome::Parsed(envelope) => {
                let cleaned: Vec<String> = envelope
                    .messages
                    .iter()
                    .map(|message| message.trim().to_owned())
                    .filter(|message| !message.is_empty())
                    .collect();
                if cleaned.is_empty() {
                    chunk_message(&combined, self.max_segment_chars)
                } else {
                    // Model proposals still pass through the deterministic
                    // length enforcer.
                    enforce_limit(&cleaned, self.max_segment_chars)
                }
            }
            StructuredOutcome::Fallback(cause) => {
                tracing::debug!(?cause, "splitter degraded to deterministic chunking");
                chunk_message(&combined, self.max_segment_chars)
            }
        };

        if let Some(first) = segments.first() {
            ctx.reply = Some(first.clone());
        }
        ctx.split_messages = segments;
    }

    async fn escalation_note(&self, ctx: &mut PipelineContext) {
        let Some(reply) = ctx.reply.clone() else {
            return;
        };

        let mut prompt_context = tera::Context::new();
        prompt_context.insert("user_message", &ctx.message);
        prompt_context.insert("reply", &reply);

        let outcome = match self.prompts.render("escalation", &prompt_context) {
            Some(system) => {
                self.completion
                    .request::<EscalationEnvelope>(ChatRequest::new(
                        system,
                        "Evalúa el intercambio.",
                    ))
                    .await
            }
            None => StructuredOutcome::Fallback(crate::structured::FallbackCause::ModelDisabled),
        };

        // Defaults to "no note" on any failure.
        ctx.justification = match outcome {
            StructuredOutcome::Parsed(envelope) if envelope.requires_justification => {
                let note = envelope.justification.trim().to_owned();
                if note.is_empty() {
                    None
                } else {
                    Some(note)
                }
            }
            _ => None,
        };
    }
}

/// Base reply plus any sub-agent fragments it does not already contain, in
/// pipeline order.
fn combined_reply(ctx: &PipelineContext) -> String {
    let mut segments: Vec<String> = Vec::new();
    if let Some(reply) = ctx.reply.as_deref() {
        if !reply.trim().is_empty() {
            segments.push(reply.trim().to_owned());
        }
    }
    for fragment in &ctx.reply_fragments {
        let cleaned = fragment.trim();
        if !cleaned.is_empty() && !segments.iter().any(|segment| segment == cleaned) {
            segments.push(cleaned.to_owned());
        }
    }
    segments.join("\n\n")
}

fn stage_instruction(stage: Stage) -> &'static str {
    match stage {
        Stage::NewProspect => {
            "Es el primer contacto con este prospecto: preséntate brevemente, responde su \
             consulta y despierta interés sin presionar una visita."
        }
        Stage::Conversation => {
            "La conversación está en curso: responde la consulta y avanza de forma natural \
             hacia conocer su forma de pago y plazo de compra."
        }
        Stage::Qualified => {
            "El prospecto está calificado: resuelve su consulta y ofrécele coordinar una \
             visita cuando sea oportuno."
        }
        Stage::NotQualified => {
            "El prospecto no calificó por ahora: responde cordialmente sin insistir en \
             agendar visitas ni en compromisos de compra."
        }
        Stage::Scheduled => {
            "El prospecto ya tiene una visita agendada: confirma los detalles pendientes y \
             resuelve dudas previas a la visita."
        }
    }
}

/// Aggregated sub-agent outputs for the composer prompt, one line each.
fn aggregated_info(ctx: &PipelineContext) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(retrieval) = &ctx.results.retrieval {
        if retrieval.status == RetrievalStatus::Ok {
            lines.push(format!("Contexto relevante: {}", retrieval.reply));
        }
    }

    if let Some(qualification) = &ctx.results.qualification {
        let mut details: Vec<String> = Vec::new();
        if !qualification.variables.forma_pago.is_empty() {
            details.push(format!("Forma de pago: {}", qualification.variables.forma_pago));
        }
        if !qualification.variables.fecha_compra_estimativa.is_empty() {
            details.push(format!(
                "Fecha estimada de compra: {}",
                qualification.variables.fecha_compra_estimativa
            ));
        }
        if !qualification.variables.notas_adicionales.is_empty() {
            details.push(format!("Notas: {}", qualification.variables.notas_adicionales));
        }
        if !details.is_empty() {
            lines.push(format!("Calificación para una visita: {}", details.join(" | ")));
        }
        if let Some(stage) = qualification.stage {
            lines.push(format!("Etapa de calificación: {stage}"));
        }
    }

    if let Some(schedule) = &ctx.results.schedule {
        if let Some(visit) = &schedule.visit {
            lines.push(format!("Visita propuesta para {}", visit.date.format("%Y-%m-%d")));
        }
    }

    if let Some(files) = &ctx.results.files {
        if !files.links.is_empty() {
            lines.push("Se enviaron los archivos solicitados.".to_owned());
        }
    }

    match ctx.handoff().map(|handoff| handoff.reason) {
        Some(HandoffReason::Desinteres) => {
            lines.push("El usuario solicitó detener la automatización.".to_owned());
        }
        Some(_) => {
            lines.push("Se notificó al vendedor para el contacto humano.".to_owned());
        }
        None => {}
    }

    if !ctx.side_effects.followups.is_empty() {
        lines.push("Se programaron seguimientos automáticos.".to_owned());
    }

    if let Some(preferences) = preferences_line(ctx) {
        lines.push(preferences);
    }

    if lines.is_empty() {
        "Sin información adicional de esta conversación.".to_owned()
    } else {
        lines.join("\n")
    }
}

/// Confirmed interests win over transient mentions.
fn preferences_line(ctx: &PipelineContext) -> Option<String> {
    let interested: Vec<&str> =
        ctx.official.properties_interested.iter().map(|project| project.name.as_str()).collect();
    if !interested.is_empty() {
        return Some(format!("Proyectos de interés confirmados: {}", interested.join(", ")));
    }

    if let Some(retrieval) = &ctx.results.retrieval {
        let names: Vec<&str> =
            retrieval.sources.iter().map(|source| source.name.as_str()).collect();
        if !names.is_empty() {
            return Some(format!("Propiedades mencionadas recientemente: {}", names.join(", ")));
        }
    }

    if ctx.mentioned_properties.is_empty() {
        None
    } else {
        let ids: Vec<&str> = ctx.mentioned_properties.iter().map(|id| id.0.as_str()).collect();
        Some(format!("Propiedades mencionadas recientemente: {}", ids.join(", ")))
    }
}
