use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use prospera_core::context::{FileLink, FilesResult, FilesStatus, PipelineContext};
use prospera_core::domain::project::{FileType, ProjectRef};
use prospera_core::errors::ApplicationError;
use prospera_core::filters::FilterSet;
use prospera_core::text::{levenshtein, normalize};
use prospera_db::repositories::ProjectFilesRepository;
use prospera_db::repositories::ProjectRepository;

use crate::llm::ChatRequest;
use crate::prompts::PromptLibrary;
use crate::structured::{StructuredCompletion, StructuredOutcome};
use crate::subagents::SubAgent;

const MISSING_INPUTS_REPLY: &str = "¿Podrías indicar qué archivos necesitas y para qué proyecto?";
const PENDING_TYPE_REPLY: &str =
    "¿Necesitas fotos, videos u otro documento? Indícamelo para ayudarte.";
const PENDING_PROJECT_REPLY: &str =
    "¿Para qué proyecto necesitas los archivos? Necesito el nombre exacto.";
const UNKNOWN_PROJECT_REPLY: &str =
    "No reconocí el nombre exacto del proyecto. ¿Podrías confirmarlo?";
const NOT_FOUND_REPLY: &str = "No encontré archivos del tipo solicitado para ese proyecto. \
                               ¿Quieres intentar con otro tipo o proyecto?";
const DEFAULT_REPLY: &str = "Enseguida busco los archivos solicitados.";

const MAX_EDIT_DISTANCE: usize = 2;

#[derive(Debug, Default, Deserialize)]
struct FilesEnvelope {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default, alias = "type")]
    types: Vec<String>,
    #[serde(default)]
    projects: Vec<String>,
}

/// Reads: message, history, realtor_id. Writes: results.files,
/// reply_fragments.
///
/// The only multi-turn clarification state machine in the pool: its ladder
/// of terminal statuses (pending_type → pending_project → unknown_project →
/// not_found → ok) is what the conversation UI keys on.
pub struct FilesAgent {
    completion: StructuredCompletion,
    prompts: Arc<PromptLibrary>,
    projects: Arc<dyn ProjectRepository>,
    files: Arc<dyn ProjectFilesRepository>,
    history_window: usize,
}

impl FilesAgent {
    pub fn new(
        completion: StructuredCompletion,
        prompts: Arc<PromptLibrary>,
        projects: Arc<dyn ProjectRepository>,
        files: Arc<dyn ProjectFilesRepository>,
        history_window: usize,
    ) -> Self {
        Self { completion, prompts, projects, files, history_window }
    }

    async fn extract(&self, ctx: &PipelineContext) -> (String, Vec<FileType>, Vec<String>) {
        let outcome = match self.prompts.render("files", &tera::Context::new()) {
            Some(system) => {
                let request = ChatRequest::new(system, ctx.message.clone())
                    .with_history(ctx.history_window(self.history_window));
                self.completion.request::<FilesEnvelope>(request).await
            }
            None => StructuredOutcome::Fallback(crate::structured::FallbackCause::ModelDisabled),
        };

        match outcome {
            StructuredOutcome::Parsed(envelope) => {
                let reply = envelope
                    .reply
                    .map(|reply| reply.trim().to_owned())
                    .filter(|reply| !reply.is_empty())
                    .unwrap_or_else(|| DEFAULT_REPLY.to_owned());
                (reply, coerce_types(&envelope.types), coerce_projects(&envelope.projects))
            }
            StructuredOutcome::Fallback(cause) => {
                tracing::debug!(?cause, "files extraction degraded to heuristics");
                (DEFAULT_REPLY.to_owned(), heuristic_types(&ctx.message), Vec::new())
            }
        }
    }
}

#[async_trait]
impl SubAgent for FilesAgent {
    fn name(&self) -> &'static str {
        "files"
    }

    fn applies(&self, filters: &FilterSet) -> bool {
        filters.files
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), ApplicationError> {
        let Some(realtor) = ctx.realtor_id.clone() else {
            let result = result_with(MISSING_INPUTS_REPLY, FilesStatus::MissingInputs);
            ctx.push_fragment(result.reply.clone());
            ctx.results.files = Some(result);
            return Ok(());
        };

        let (reply, file_types, projects_requested) = self.extract(ctx).await;

        if file_types.is_empty() {
            let result = result_with(PENDING_TYPE_REPLY, FilesStatus::PendingType);
            ctx.push_fragment(result.reply.clone());
            ctx.results.files = Some(result);
            return Ok(());
        }

        if projects_requested.is_empty() {
            let result = result_with(PENDING_PROJECT_REPLY, FilesStatus::PendingProject);
            ctx.push_fragment(result.reply.clone());
            ctx.results.files = Some(result);
            return Ok(());
        }

        let catalog = match self.projects.list_for_realtor(&realtor).await {
            Ok(catalog) => catalog,
            Err(error) => {
                tracing::error!(error = %error, "project catalog lookup failed");
                let result = result_with(NOT_FOUND_REPLY, FilesStatus::NotFound);
                ctx.push_fragment(result.reply.clone());
                ctx.results.files = Some(result);
                return Ok(());
            }
        };

        let matches = match_projects(&projects_requested, &catalog);
        if matches.is_empty() {
            let result = result_with(UNKNOWN_PROJECT_REPLY, FilesStatus::UnknownProject);
            ctx.push_fragment(result.reply.clone());
            ctx.results.files = Some(result);
            return Ok(());
        }

        let mut links: Vec<FileLink> = Vec::new();
        for project in &matches {
            for file_type in &file_types {
                match self.files.list(&project.id, *file_type).await {
                    Ok(files) => {
                        links.extend(files.into_iter().map(|file| FileLink {
                            project: project.name.clone(),
                            file_type: *file_type,
                            url: file.url,
                        }));
                    }
                    Err(error) => {
                        tracing::error!(
                            error = %error,
                            project = project.id.0.as_str(),
                            "file lookup failed"
                        );
                    }
                }
            }
        }

        let result = if links.is_empty() {
            result_with(NOT_FOUND_REPLY, FilesStatus::NotFound)
        } else {
            FilesResult { reply: compose_reply(&reply, &links), links, status: FilesStatus::Ok }
        };

        ctx.push_fragment(result.reply.clone());
        ctx.results.files = Some(result);
        Ok(())
    }
}

fn result_with(reply: &str, status: FilesStatus) -> FilesResult {
    FilesResult { reply: reply.to_owned(), links: Vec::new(), status }
}

fn coerce_types(raw: &[String]) -> Vec<FileType> {
    let mut types = Vec::new();
    for item in raw {
        if let Ok(file_type) = item.parse::<FileType>() {
            if !types.contains(&file_type) {
                types.push(file_type);
            }
        }
    }
    types
}

fn coerce_projects(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect()
}

fn heuristic_types(message: &str) -> Vec<FileType> {
    let text = normalize(message);
    let mut types = Vec::new();
    if text.contains("foto") || text.contains("imagen") {
        types.push(FileType::Image);
    }
    if text.contains("video") {
        types.push(FileType::Video);
    }
    if text.contains("kmz") {
        types.push(FileType::Kmz);
    }
    if text.contains("documento") || text.contains("pdf") {
        types.push(FileType::Document);
    }
    types
}

/// Case-insensitive exact match first, then a bounded edit-distance pass for
/// near-misses like missing accents or a dropped letter.
fn match_projects(requested: &[String], catalog: &[ProjectRef]) -> Vec<ProjectRef> {
    let mut matches: Vec<ProjectRef> = Vec::new();
    for name in requested {
        let wanted = normalize(name);

        let found = catalog
            .iter()
            .find(|project| normalize(&project.name) == wanted)
            .or_else(|| {
                catalog
                    .iter()
                    .map(|project| (levenshtein(&normalize(&project.name), &wanted), project))
                    .filter(|(distance, _)| *distance <= MAX_EDIT_DISTANCE)
                    .min_by_key(|(distance, _)| *distance)
                    .map(|(_, project)| project)
            });

        if let Some(project) = found {
            if !matches.iter().any(|existing| existing.id == project.id) {
                matches.push(project.clone());
            }
        }
    }
    matches
}

fn compose_reply(reply: &str, links: &[FileLink]) -> String {
    let mut lines = vec![reply.trim().to_owned()];
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for link in links {
        if link.url.is_empty() {
            continue;
        }
        match grouped.iter_mut().find(|(project, _)| *project == link.project.as_str()) {
            Some((_, urls)) => urls.push(&link.url),
            None => grouped.push((link.project.as_str(), vec![&link.url])),
        }
    }
    for (project, urls) in grouped {
        lines.push(format!("{project}: {}", urls.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;

    use prospera_core::context::{FilesStatus, PipelineContext};
    use prospera_core::domain::ids::{ProjectId, RealtorId, SessionKey};
    use prospera_core::domain::official::OfficialData;
    use prospera_core::domain::project::{FileType, ProjectFile, ProjectRef};
    use prospera_core::domain::stage::Stage;
    use prospera_db::repositories::{
        InMemoryProjectFilesRepository, InMemoryProjectRepository,
    };

    use super::FilesAgent;
    use crate::llm::{DisabledLlm, LlmClient, ScriptedLlm};
    use crate::prompts::PromptLibrary;
    use crate::structured::StructuredCompletion;
    use crate::subagents::SubAgent;

    async fn seeded_stores() -> (Arc<InMemoryProjectRepository>, Arc<InMemoryProjectFilesRepository>)
    {
        let projects = Arc::new(InMemoryProjectRepository::default());
        projects
            .insert(ProjectRef {
                id: ProjectId("p-1".to_owned()),
                realtor_id: RealtorId("r-1".to_owned()),
                name: "Mirador del Valle".to_owned(),
            })
            .await;
        let files = Arc::new(InMemoryProjectFilesRepository::default());
        files
            .insert(ProjectFile {
                project_id: ProjectId("p-1".to_owned()),
                file_type: FileType::Image,
                url: "https://cdn/p1-front.jpg".to_owned(),
            })
            .await;
        (projects, files)
    }

    fn agent(
        llm: Arc<dyn LlmClient>,
        projects: Arc<InMemoryProjectRepository>,
        files: Arc<InMemoryProjectFilesRepository>,
    ) -> FilesAgent {
        FilesAgent::new(
            StructuredCompletion::new(llm, Duration::from_secs(5)),
            Arc::new(PromptLibrary::new().expect("prompts")),
            projects,
            files,
            30,
        )
    }

    fn ctx(message: &str) -> PipelineContext {
        PipelineContext::new(
            SessionKey("569:r-1".to_owned()),
            message.to_owned(),
            Some(RealtorId("r-1".to_owned())),
            None,
            Vec::new(),
            Stage::Conversation,
            OfficialData::default(),
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        )
    }

    #[tokio::test]
    async fn no_recognized_type_asks_for_type() {
        let (projects, files) = seeded_stores().await;
        let agent = agent(Arc::new(DisabledLlm), projects, files);

        let mut ctx = ctx("¿Me puedes enviar algo del proyecto?");
        agent.run(&mut ctx).await.expect("run");

        assert_eq!(ctx.results.files.expect("result").status, FilesStatus::PendingType);
    }

    #[tokio::test]
    async fn type_without_project_asks_for_project() {
        let (projects, files) = seeded_stores().await;
        let agent = agent(Arc::new(DisabledLlm), projects, files);

        let mut ctx = ctx("Envíame fotos por favor");
        agent.run(&mut ctx).await.expect("run");

        assert_eq!(ctx.results.files.expect("result").status, FilesStatus::PendingProject);
    }

    #[tokio::test]
    async fn unrecognized_project_name_is_reported() {
        let (projects, files) = seeded_stores().await;
        let agent = agent(
            Arc::new(ScriptedLlm::replying(&[
                r#"{"reply": "Busco eso.", "types": ["image"], "projects": ["Torre Pacífico"]}"#,
            ])),
            projects,
            files,
        );

        let mut ctx = ctx("Fotos de Torre Pacífico");
        agent.run(&mut ctx).await.expect("run");

        assert_eq!(ctx.results.files.expect("result").status, FilesStatus::UnknownProject);
    }

    #[tokio::test]
    async fn resolved_request_with_no_files_reports_not_found() {
        let (projects, files) = seeded_stores().await;
        let agent = agent(
            Arc::new(ScriptedLlm::replying(&[
                r#"{"reply": "Busco eso.", "types": ["video"], "projects": ["Mirador del Valle"]}"#,
            ])),
            projects,
            files,
        );

        let mut ctx = ctx("Videos del Mirador del Valle");
        agent.run(&mut ctx).await.expect("run");

        assert_eq!(ctx.results.files.expect("result").status, FilesStatus::NotFound);
    }

    #[tokio::test]
    async fn exact_and_fuzzy_matches_deliver_links() {
        let (projects, files) = seeded_stores().await;
        let agent = agent(
            Arc::new(ScriptedLlm::replying(&[
                // Missing accent + dropped letter: edit distance 1 from the
                // catalog name after normalization.
                r#"{"reply": "Aquí van.", "types": ["image"], "projects": ["Mirador del Vale"]}"#,
            ])),
            projects,
            files,
        );

        let mut ctx = ctx("Fotos del Mirador del Vale");
        agent.run(&mut ctx).await.expect("run");

        let result = ctx.results.files.expect("result");
        assert_eq!(result.status, FilesStatus::Ok);
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].url, "https://cdn/p1-front.jpg");
        assert!(result.reply.contains("Mirador del Valle: https://cdn/p1-front.jpg"));
    }

    #[tokio::test]
    async fn missing_realtor_reports_missing_inputs() {
        let (projects, files) = seeded_stores().await;
        let agent = agent(Arc::new(DisabledLlm), projects, files);

        let mut ctx = ctx("Fotos del Mirador");
        ctx.realtor_id = None;
        agent.run(&mut ctx).await.expect("run");

        assert_eq!(ctx.results.files.expect("result").status, FilesStatus::MissingInputs);
    }
}
