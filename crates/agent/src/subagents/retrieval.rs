use std::sync::Arc;

use async_trait::async_trait;

use prospera_core::context::{
    PipelineContext, RetrievalFallback, RetrievalResult, RetrievalStatus, RetrievedSource,
};
use prospera_core::domain::ids::ProjectId;
use prospera_core::errors::ApplicationError;
use prospera_core::filters::FilterSet;
use prospera_core::text::normalize;

use crate::llm::ChatRequest;
use crate::prompts::PromptLibrary;
use crate::structured::StructuredCompletion;
use crate::subagents::SubAgent;
use crate::vector::{VectorHit, VectorSearch, VectorSearchError};

const SNIPPET_CHAR_LIMIT: usize = 600;

const STOPWORDS: [&str; 26] = [
    "que", "tienes", "tengo", "hay", "una", "un", "los", "las", "en", "de", "para", "con",
    "disponibles", "disponible", "sobre", "cuales", "donde", "me", "puedes", "puedo", "por",
    "favor", "del", "como", "este", "esta",
];

/// Reads: message, history, realtor_id. Writes: results.retrieval,
/// reply_fragments, mentioned_properties.
pub struct RetrievalAgent {
    vector: Arc<dyn VectorSearch>,
    completion: StructuredCompletion,
    prompts: Arc<PromptLibrary>,
    failure_reply: String,
    history_window: usize,
}

impl RetrievalAgent {
    pub fn new(
        vector: Arc<dyn VectorSearch>,
        completion: StructuredCompletion,
        prompts: Arc<PromptLibrary>,
        failure_reply: String,
        history_window: usize,
    ) -> Self {
        Self { vector, completion, prompts, failure_reply, history_window }
    }

    fn fallback_result(&self, cause: RetrievalFallback) -> RetrievalResult {
        RetrievalResult {
            reply: self.failure_reply.clone(),
            sources: Vec::new(),
            mentioned_properties: Vec::new(),
            status: RetrievalStatus::Fallback(cause),
        }
    }

    /// Main query first; when it returns nothing, up to three simplified
    /// variants, stopping at the first non-empty result set.
    async fn search_with_fallbacks(
        &self,
        message: &str,
        realtor: &prospera_core::domain::ids::RealtorId,
    ) -> Result<Vec<VectorHit>, RetrievalFallback> {
        let classify = |error: VectorSearchError| match error {
            VectorSearchError::Disabled => RetrievalFallback::VectorServiceDisabled,
            _ => RetrievalFallback::RagException,
        };

        let hits = self.vector.search(message, realtor).await.map_err(classify)?;
        if !hits.is_empty() {
            return Ok(hits);
        }

        for candidate in fallback_queries(message) {
            let hits = self.vector.search(&candidate, realtor).await.map_err(classify)?;
            if !hits.is_empty() {
                tracing::debug!(
                    query = candidate.as_str(),
                    results = hits.len(),
                    "fallback vector query produced results"
                );
                return Ok(hits);
            }
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl SubAgent for RetrievalAgent {
    fn name(&self) -> &'static str {
        "retrieval"
    }

    fn applies(&self, filters: &FilterSet) -> bool {
        filters.rag
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), ApplicationError> {
        let Some(realtor) = ctx.realtor_id.clone() else {
            tracing::warn!(session = ctx.session_key.as_str(), "retrieval skipped: no realtor id");
            return Ok(());
        };

        let hits = match self.search_with_fallbacks(&ctx.message, &realtor).await {
            Ok(hits) => hits,
            Err(cause) => {
                tracing::warn!(?cause, "vector search unavailable, using safe fallback reply");
                let result = self.fallback_result(cause);
                ctx.push_fragment(result.reply.clone());
                ctx.results.retrieval = Some(result);
                return Ok(());
            }
        };

        let sources: Vec<RetrievedSource> = hits
            .iter()
            .map(|hit| RetrievedSource {
                project_id: ProjectId(hit.project_id.clone()),
                name: hit.display_name(),
                score: hit.score,
            })
            .collect();

        let mut prompt_context = tera::Context::new();
        prompt_context.insert("question", &ctx.message);
        prompt_context.insert("context_block", &format_context(&hits));

        let reply = match self.prompts.render("retrieval", &prompt_context) {
            Some(system) => {
                let request = ChatRequest::new(system, ctx.message.clone())
                    .with_history(ctx.history_window(self.history_window));
                self.completion.text(request).await
            }
            None => None,
        };

        let result = match reply {
            Some(reply) => {
                let mentioned: Vec<ProjectId> =
                    sources.iter().map(|source| source.project_id.clone()).collect();
                ctx.add_mentioned_properties(mentioned.iter().cloned());
                RetrievalResult {
                    reply,
                    sources,
                    mentioned_properties: mentioned,
                    status: RetrievalStatus::Ok,
                }
            }
            None => self.fallback_result(RetrievalFallback::EmptyResponse),
        };

        ctx.push_fragment(result.reply.clone());
        ctx.results.retrieval = Some(result);
        Ok(())
    }
}

fn format_context(hits: &[VectorHit]) -> String {
    if hits.is_empty() {
        return "Sin contexto relevante disponible.".to_owned();
    }

    hits.iter()
        .map(|hit| {
            let snippet: String = hit.content.chars().take(SNIPPET_CHAR_LIMIT).collect();
            format!("Proyecto {} (id {}): {}", hit.display_name(), hit.project_id, snippet.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Simplified query variants for the retry ladder: accent-stripped,
/// stop-word-filtered, and top-5-keyword forms, deduplicated against the
/// original query. At most three candidates.
fn fallback_queries(query: &str) -> Vec<String> {
    let normalized: String = normalize(query)
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch.is_whitespace() { ch } else { ' ' })
        .collect();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Vec::new();
    }

    let tokens: Vec<&str> = normalized
        .split_whitespace()
        .filter(|token| token.len() > 2 && !STOPWORDS.contains(token))
        .collect();

    let mut candidates: Vec<String> = Vec::new();
    if normalized != query {
        candidates.push(normalized.clone());
    }

    let keywords = tokens.join(" ");
    if !keywords.is_empty() && keywords != query && keywords != normalized {
        candidates.push(keywords);
    }

    if !tokens.is_empty() {
        let top_tokens = tokens.iter().take(5).copied().collect::<Vec<_>>().join(" ");
        if !candidates.contains(&top_tokens) {
            candidates.push(top_tokens);
        }
    }

    candidates.truncate(3);
    candidates
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use prospera_core::context::{PipelineContext, RetrievalFallback, RetrievalStatus};
    use prospera_core::domain::ids::{RealtorId, SessionKey};
    use prospera_core::domain::official::OfficialData;
    use prospera_core::domain::stage::Stage;

    use super::{fallback_queries, RetrievalAgent};
    use crate::llm::{DisabledLlm, ScriptedLlm};
    use crate::prompts::PromptLibrary;
    use crate::structured::StructuredCompletion;
    use crate::subagents::SubAgent;
    use crate::vector::{StaticVectorSearch, VectorSearch, VectorSearchError};

    struct FailingVectorSearch;

    #[async_trait]
    impl VectorSearch for FailingVectorSearch {
        async fn search(
            &self,
            _query: &str,
            _realtor: &RealtorId,
        ) -> Result<Vec<crate::vector::VectorHit>, VectorSearchError> {
            Err(VectorSearchError::Http("500 internal".to_owned()))
        }
    }

    fn context() -> PipelineContext {
        PipelineContext::new(
            SessionKey("569:r-1".to_owned()),
            "¿Qué proyectos tienen disponibles?".to_owned(),
            Some(RealtorId("r-1".to_owned())),
            None,
            Vec::new(),
            Stage::NewProspect,
            OfficialData::default(),
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        )
    }

    fn agent(vector: Arc<dyn VectorSearch>, llm: Arc<dyn crate::llm::LlmClient>) -> RetrievalAgent {
        RetrievalAgent::new(
            vector,
            StructuredCompletion::new(llm, Duration::from_secs(5)),
            Arc::new(PromptLibrary::new().expect("prompts")),
            "No puedo revisar la información ahora mismo.".to_owned(),
            30,
        )
    }

    #[tokio::test]
    async fn successful_retrieval_cites_sources_and_merges_mentions() {
        let vector = Arc::new(StaticVectorSearch::new(vec![StaticVectorSearch::hit(
            "p-1",
            "Mirador del Valle",
            "Departamentos de 2 y 3 dormitorios desde 2.500 UF.",
        )]));
        let llm =
            Arc::new(ScriptedLlm::replying(&["Tenemos el proyecto Mirador del Valle desde 2.500 UF."]));
        let agent = agent(vector, llm);

        let mut ctx = context();
        agent.run(&mut ctx).await.expect("run");

        let result = ctx.results.retrieval.expect("result");
        assert_eq!(result.status, RetrievalStatus::Ok);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].name, "Mirador del Valle");
        assert_eq!(ctx.mentioned_properties.len(), 1);
        assert_eq!(ctx.mentioned_properties[0].0, "p-1");
        assert_eq!(ctx.reply_fragments.len(), 1);
    }

    #[tokio::test]
    async fn search_error_degrades_to_safe_reply() {
        let agent = agent(Arc::new(FailingVectorSearch), Arc::new(DisabledLlm));

        let mut ctx = context();
        agent.run(&mut ctx).await.expect("run");

        let result = ctx.results.retrieval.expect("result");
        assert_eq!(
            result.status,
            RetrievalStatus::Fallback(RetrievalFallback::RagException)
        );
        assert_eq!(result.reply, "No puedo revisar la información ahora mismo.");
        assert!(ctx.mentioned_properties.is_empty());
    }

    #[tokio::test]
    async fn empty_completion_reports_empty_response() {
        let vector = Arc::new(StaticVectorSearch::new(vec![StaticVectorSearch::hit(
            "p-1",
            "Mirador del Valle",
            "Contenido.",
        )]));
        let agent = agent(vector, Arc::new(DisabledLlm));

        let mut ctx = context();
        agent.run(&mut ctx).await.expect("run");

        let result = ctx.results.retrieval.expect("result");
        assert_eq!(
            result.status,
            RetrievalStatus::Fallback(RetrievalFallback::EmptyResponse)
        );
    }

    #[tokio::test]
    async fn missing_realtor_is_a_silent_noop() {
        let agent = agent(Arc::new(StaticVectorSearch::default()), Arc::new(DisabledLlm));

        let mut ctx = context();
        ctx.realtor_id = None;
        agent.run(&mut ctx).await.expect("run");

        assert!(ctx.results.retrieval.is_none());
        assert!(ctx.reply_fragments.is_empty());
    }

    #[test]
    fn fallback_queries_simplify_progressively() {
        let queries = fallback_queries("¿Qué proyectos tienen disponibles en Ñuñoa?");
        assert!(!queries.is_empty());
        assert!(queries.len() <= 3);
        // Accent-stripped form comes first, keyword forms drop stopwords.
        assert!(queries[0].contains("nunoa"));
        assert!(queries.iter().any(|q| !q.contains("tienen")));
    }

    #[test]
    fn unusable_query_produces_no_candidates() {
        assert!(fallback_queries("¿¿??").is_empty());
    }
}
