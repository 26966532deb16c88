use std::collections::BTreeSet;

use serde::Deserialize;

use prospera_core::domain::history::ChatTurn;
use prospera_core::domain::intent::{expand_aliases, Intent};
use prospera_core::domain::official::OfficialData;
use prospera_core::text::normalize;

use crate::llm::ChatRequest;
use crate::prompts::PromptLibrary;
use crate::structured::{StructuredCompletion, StructuredOutcome};

#[derive(Debug, Default, Deserialize)]
struct ClassifierEnvelope {
    #[serde(default)]
    intents: Vec<String>,
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    handoff: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierOutput {
    pub intents: BTreeSet<Intent>,
    pub reply: Option<String>,
    pub handoff: bool,
}

/// LLM-first intent classification with a deterministic keyword fallback.
///
/// Whatever path produced the primary set, a secondary keyword pass ensures
/// the file-delivery, human-contact and opt-out intents are never missed,
/// the photo-request alias is expanded, and an empty set falls back to the
/// default information-seeking label. The output set is never empty.
pub struct IntentClassifier {
    completion: StructuredCompletion,
}

impl IntentClassifier {
    pub fn new(completion: StructuredCompletion) -> Self {
        Self { completion }
    }

    pub async fn classify(
        &self,
        prompts: &PromptLibrary,
        message: &str,
        history: &[ChatTurn],
        official: &OfficialData,
    ) -> ClassifierOutput {
        let llm_output = match prompts.render("classifier", &tera::Context::new()) {
            Some(system) => {
                let mut request = ChatRequest::new(system, message).with_history(history);
                if let Some(block) = context_block(official) {
                    request = request.with_system(block);
                }
                self.completion.request::<ClassifierEnvelope>(request).await
            }
            None => StructuredOutcome::Fallback(crate::structured::FallbackCause::ModelDisabled),
        };

        let mut output = match llm_output {
            StructuredOutcome::Parsed(envelope) => ClassifierOutput {
                intents: coerce_intents(&envelope.intents),
                reply: envelope.reply.map(|reply| reply.trim().to_owned()).filter(|r| !r.is_empty()),
                handoff: envelope.handoff,
            },
            StructuredOutcome::Fallback(cause) => {
                tracing::debug!(?cause, "classifier degraded to keyword heuristics");
                ClassifierOutput {
                    intents: heuristic_intents(message),
                    reply: None,
                    handoff: false,
                }
            }
        };

        augment_intents(message, &mut output.intents);
        expand_aliases(&mut output.intents);
        if output.intents.is_empty() {
            output.intents.insert(Intent::BusquedaInformacion);
        }
        output
    }
}

/// Compiled realtor/bot/interest context for the classifier prompt.
pub fn context_block(official: &OfficialData) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(name) = official.realtor.name.as_deref() {
        parts.push(format!("Inmobiliaria: {name}"));
    }
    if let Some(description) = official.realtor.description.as_deref() {
        parts.push(format!("Descripción: {description}"));
    }
    if let Some(name) = official.bot.name.as_deref() {
        parts.push(format!("Nombre del bot: {name}"));
    }
    if let Some(personality) = official.bot.personality.as_deref() {
        parts.push(format!("Personalidad: {personality}"));
    }
    if let Some(tone) = official.bot.tone.as_deref() {
        parts.push(format!("Tono sugerido: {tone}"));
    }
    if !official.properties_interested.is_empty() {
        let names: Vec<&str> =
            official.properties_interested.iter().map(|p| p.name.as_str()).collect();
        parts.push(format!("Proyectos interesados: {}", names.join(", ")));
    }
    if !official.mentioned_properties.is_empty() {
        let ids: Vec<&str> =
            official.mentioned_properties.iter().map(|p| p.0.as_str()).collect();
        parts.push(format!("Propiedades mencionadas: {}", ids.join(", ")));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn coerce_intents(labels: &[String]) -> BTreeSet<Intent> {
    let mut intents = BTreeSet::new();
    for label in labels {
        match label.parse::<Intent>() {
            Ok(intent) => {
                intents.insert(intent);
            }
            Err(_) => {
                tracing::warn!(label = label.as_str(), "dropping unknown intent label");
            }
        }
    }
    intents
}

fn heuristic_intents(message: &str) -> BTreeSet<Intent> {
    let normalized = normalize(message);
    let mut intents = BTreeSet::new();
    for intent in Intent::ALL {
        if intent.keywords().iter().any(|keyword| normalized.contains(keyword)) {
            intents.insert(intent);
        }
    }
    intents
}

/// Secondary pass over the raw message; runs on both the LLM and heuristic
/// paths so these three intents are never missed.
fn augment_intents(message: &str, intents: &mut BTreeSet<Intent>) {
    let normalized = normalize(message);
    for intent in Intent::ALL {
        if let Some(keywords) = intent.augmentation_keywords() {
            if keywords.iter().any(|keyword| normalized.contains(keyword)) {
                intents.insert(intent);
            }
        }
    }
}
