use std::sync::Arc;

use async_trait::async_trait;

use prospera_core::context::{InterestResult, InterestStatus, PipelineContext};
use prospera_core::domain::ids::{ProjectId, ProspectId, RealtorId};
use prospera_core::errors::ApplicationError;
use prospera_core::filters::FilterSet;
use prospera_db::repositories::{InterestRepository, ProjectRepository};

use crate::subagents::SubAgent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterestAction {
    Link,
    Unlink,
}

/// Reads: prospect_id, realtor_id, mentioned_properties (fed by retrieval —
/// this dependency is why the pool order is fixed). Writes:
/// results.interest, reply_fragments.
pub struct InterestAgent {
    projects: Arc<dyn ProjectRepository>,
    interests: Arc<dyn InterestRepository>,
}

impl InterestAgent {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        interests: Arc<dyn InterestRepository>,
    ) -> Self {
        Self { projects, interests }
    }

    /// Link or unlink a candidate set for a prospect. Linking is idempotent:
    /// ids already linked land in `skipped`, as do ids that fail the tenant
    /// ownership check.
    pub async fn apply(
        &self,
        prospect: &ProspectId,
        realtor: &RealtorId,
        candidates: &[ProjectId],
        action: InterestAction,
    ) -> InterestResult {
        let owned = match self.projects.filter_owned(realtor, candidates).await {
            Ok(owned) => owned,
            Err(error) => {
                tracing::error!(error = %error, "project ownership check failed");
                return InterestResult {
                    added: Vec::new(),
                    removed: Vec::new(),
                    skipped: candidates.to_vec(),
                    status: InterestStatus::Error,
                };
            }
        };

        let owned_ids: Vec<ProjectId> = owned.iter().map(|project| project.id.clone()).collect();
        let mut skipped: Vec<ProjectId> =
            candidates.iter().filter(|id| !owned_ids.contains(id)).cloned().collect();

        match action {
            InterestAction::Link => {
                let linked = match self.interests.linked_ids(prospect).await {
                    Ok(linked) => linked,
                    Err(error) => {
                        tracing::error!(error = %error, "could not load existing interests");
                        skipped.extend(owned_ids);
                        return InterestResult {
                            added: Vec::new(),
                            removed: Vec::new(),
                            skipped,
                            status: InterestStatus::Error,
                        };
                    }
                };

                let to_insert: Vec<ProjectId> =
                    owned_ids.iter().filter(|id| !linked.contains(id)).cloned().collect();
                skipped.extend(owned_ids.iter().filter(|id| linked.contains(id)).cloned());

                if to_insert.is_empty() {
                    return InterestResult {
                        added: Vec::new(),
                        removed: Vec::new(),
                        skipped,
                        status: InterestStatus::Noop,
                    };
                }

                match self.interests.link(prospect, &to_insert).await {
                    Ok(()) => InterestResult {
                        added: to_insert,
                        removed: Vec::new(),
                        skipped,
                        status: InterestStatus::Ok,
                    },
                    Err(error) => {
                        tracing::error!(error = %error, "interest link failed");
                        skipped.extend(to_insert);
                        InterestResult {
                            added: Vec::new(),
                            removed: Vec::new(),
                            skipped,
                            status: InterestStatus::Error,
                        }
                    }
                }
            }
            InterestAction::Unlink => match self.interests.unlink(prospect, &owned_ids).await {
                Ok(removed) => {
                    skipped.extend(owned_ids.iter().filter(|id| !removed.contains(id)).cloned());
                    let status =
                        if removed.is_empty() { InterestStatus::Noop } else { InterestStatus::Ok };
                    InterestResult { added: Vec::new(), removed, skipped, status }
                }
                Err(error) => {
                    tracing::error!(error = %error, "interest unlink failed");
                    skipped.extend(owned_ids);
                    InterestResult {
                        added: Vec::new(),
                        removed: Vec::new(),
                        skipped,
                        status: InterestStatus::Error,
                    }
                }
            },
        }
    }
}

#[async_trait]
impl SubAgent for InterestAgent {
    fn name(&self) -> &'static str {
        "interest"
    }

    fn applies(&self, filters: &FilterSet) -> bool {
        filters.intention
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), ApplicationError> {
        let (Some(prospect), Some(realtor)) = (ctx.prospect_id.clone(), ctx.realtor_id.clone())
        else {
            // Precondition failure, not a user-visible error.
            tracing::warn!(
                session = ctx.session_key.as_str(),
                "interest tracking skipped: missing prospect or realtor id"
            );
            return Ok(());
        };

        let candidates = ctx.mentioned_properties.clone();
        if candidates.is_empty() {
            ctx.results.interest = Some(InterestResult {
                added: Vec::new(),
                removed: Vec::new(),
                skipped: Vec::new(),
                status: InterestStatus::Skipped,
            });
            return Ok(());
        }

        let result = self.apply(&prospect, &realtor, &candidates, InterestAction::Link).await;

        if !result.added.is_empty() {
            ctx.push_fragment("He guardado tus proyectos de interés.");
        } else if !result.skipped.is_empty() && result.status == InterestStatus::Error {
            ctx.push_fragment("No pude guardar algunos proyectos. Un asesor revisará tu solicitud.");
        }

        ctx.results.interest = Some(result);
        Ok(())
    }
}
