//! In-memory repository implementations. First-class citizens: pipeline
//! tests and storeless deployments run against these.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use prospera_core::domain::history::ChatTurn;
use prospera_core::domain::ids::{BrokerId, ProjectId, ProspectId, RealtorId, SessionKey};
use prospera_core::domain::project::{FileType, ProjectFile, ProjectRef};
use prospera_core::domain::prospect::{Prospect, QualificationVariables};
use prospera_core::domain::stage::Stage;
use prospera_core::effects::{BrokerRef, FollowupKind};

use super::{
    BrokerRepository, ChatHistoryRepository, FollowupRecord, FollowupRepository,
    InterestRepository, ProjectFilesRepository, ProjectRepository, ProspectRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryProspectRepository {
    prospects: RwLock<HashMap<String, Prospect>>,
}

impl InMemoryProspectRepository {
    pub async fn insert(&self, prospect: Prospect) {
        self.prospects.write().await.insert(prospect.id.0.clone(), prospect);
    }

    pub async fn get(&self, id: &ProspectId) -> Option<Prospect> {
        self.prospects.read().await.get(&id.0).cloned()
    }
}

#[async_trait::async_trait]
impl ProspectRepository for InMemoryProspectRepository {
    async fn find_by_phone(
        &self,
        realtor: &RealtorId,
        telephone: &str,
    ) -> Result<Option<Prospect>, RepositoryError> {
        let prospects = self.prospects.read().await;
        Ok(prospects
            .values()
            .find(|p| p.realtor_id == *realtor && p.telephone == telephone)
            .cloned())
    }

    async fn create(
        &self,
        realtor: &RealtorId,
        telephone: &str,
    ) -> Result<Prospect, RepositoryError> {
        let prospect = Prospect {
            id: ProspectId(Uuid::new_v4().to_string()),
            realtor_id: realtor.clone(),
            telephone: telephone.to_owned(),
            name: None,
            stage: Stage::NewProspect,
            vendor_id: None,
            qualification: QualificationVariables::default(),
            scheduled_at: None,
            created_at: Utc::now(),
        };
        self.insert(prospect.clone()).await;
        Ok(prospect)
    }

    async fn merge_qualification(
        &self,
        prospect: &ProspectId,
        incoming: &QualificationVariables,
        stage: Option<Stage>,
    ) -> Result<(), RepositoryError> {
        let mut prospects = self.prospects.write().await;
        let record = prospects
            .get_mut(&prospect.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("prospect {}", prospect.0)))?;
        record.qualification.merge_from(incoming);
        if let Some(stage) = stage {
            record.stage = stage;
        }
        Ok(())
    }

    async fn record_visit(
        &self,
        prospect: &ProspectId,
        date: NaiveDate,
        stage: Stage,
    ) -> Result<(), RepositoryError> {
        let mut prospects = self.prospects.write().await;
        let record = prospects
            .get_mut(&prospect.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("prospect {}", prospect.0)))?;
        record.scheduled_at = Some(date);
        record.stage = stage;
        Ok(())
    }

    async fn assign_vendor(
        &self,
        prospect: &ProspectId,
        broker: &BrokerId,
    ) -> Result<bool, RepositoryError> {
        let mut prospects = self.prospects.write().await;
        let record = prospects
            .get_mut(&prospect.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("prospect {}", prospect.0)))?;
        if record.vendor_id.is_some() {
            return Ok(false);
        }
        record.vendor_id = Some(broker.clone());
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryProjectRepository {
    projects: RwLock<Vec<ProjectRef>>,
}

impl InMemoryProjectRepository {
    pub async fn insert(&self, project: ProjectRef) {
        self.projects.write().await.push(project);
    }
}

#[async_trait::async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn list_for_realtor(
        &self,
        realtor: &RealtorId,
    ) -> Result<Vec<ProjectRef>, RepositoryError> {
        let projects = self.projects.read().await;
        Ok(projects.iter().filter(|p| p.realtor_id == *realtor).cloned().collect())
    }

    async fn filter_owned(
        &self,
        realtor: &RealtorId,
        ids: &[ProjectId],
    ) -> Result<Vec<ProjectRef>, RepositoryError> {
        let projects = self.projects.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                projects.iter().find(|p| p.realtor_id == *realtor && p.id == *id).cloned()
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryInterestRepository {
    links: RwLock<HashMap<String, Vec<ProjectId>>>,
}

#[async_trait::async_trait]
impl InterestRepository for InMemoryInterestRepository {
    async fn linked_ids(&self, prospect: &ProspectId) -> Result<Vec<ProjectId>, RepositoryError> {
        let links = self.links.read().await;
        Ok(links.get(&prospect.0).cloned().unwrap_or_default())
    }

    async fn link(&self, prospect: &ProspectId, ids: &[ProjectId]) -> Result<(), RepositoryError> {
        let mut links = self.links.write().await;
        let linked = links.entry(prospect.0.clone()).or_default();
        for id in ids {
            if !linked.contains(id) {
                linked.push(id.clone());
            }
        }
        Ok(())
    }

    async fn unlink(
        &self,
        prospect: &ProspectId,
        ids: &[ProjectId],
    ) -> Result<Vec<ProjectId>, RepositoryError> {
        let mut links = self.links.write().await;
        let linked = links.entry(prospect.0.clone()).or_default();
        let mut removed = Vec::new();
        linked.retain(|id| {
            if ids.contains(id) {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}

#[derive(Default)]
pub struct InMemoryProjectFilesRepository {
    files: RwLock<Vec<ProjectFile>>,
}

impl InMemoryProjectFilesRepository {
    pub async fn insert(&self, file: ProjectFile) {
        self.files.write().await.push(file);
    }
}

#[async_trait::async_trait]
impl ProjectFilesRepository for InMemoryProjectFilesRepository {
    async fn list(
        &self,
        project: &ProjectId,
        file_type: FileType,
    ) -> Result<Vec<ProjectFile>, RepositoryError> {
        let files = self.files.read().await;
        Ok(files
            .iter()
            .filter(|f| f.project_id == *project && f.file_type == file_type)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryFollowupRepository {
    followups: RwLock<Vec<(String, String, String, FollowupKind, DateTime<Utc>)>>,
}

#[async_trait::async_trait]
impl FollowupRepository for InMemoryFollowupRepository {
    async fn list_open(
        &self,
        prospect: &ProspectId,
        realtor: &RealtorId,
        kind: FollowupKind,
    ) -> Result<Vec<FollowupRecord>, RepositoryError> {
        let followups = self.followups.read().await;
        Ok(followups
            .iter()
            .filter(|(_, p, r, k, _)| *p == prospect.0 && *r == realtor.0 && *k == kind)
            .map(|(id, _, _, k, at)| FollowupRecord {
                id: id.clone(),
                kind: *k,
                scheduled_at: *at,
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), RepositoryError> {
        let mut followups = self.followups.write().await;
        followups.retain(|(id, ..)| !ids.contains(id));
        Ok(())
    }

    async fn create(
        &self,
        prospect: &ProspectId,
        realtor: &RealtorId,
        kind: FollowupKind,
        scheduled_at: DateTime<Utc>,
    ) -> Result<FollowupRecord, RepositoryError> {
        let record = FollowupRecord { id: Uuid::new_v4().to_string(), kind, scheduled_at };
        self.followups.write().await.push((
            record.id.clone(),
            prospect.0.clone(),
            realtor.0.clone(),
            kind,
            scheduled_at,
        ));
        Ok(record)
    }
}

#[derive(Default)]
pub struct InMemoryBrokerRepository {
    brokers: RwLock<Vec<(RealtorId, BrokerRef)>>,
}

impl InMemoryBrokerRepository {
    pub async fn insert(&self, realtor: RealtorId, broker: BrokerRef) {
        self.brokers.write().await.push((realtor, broker));
    }
}

#[async_trait::async_trait]
impl BrokerRepository for InMemoryBrokerRepository {
    async fn list_active(&self, realtor: &RealtorId) -> Result<Vec<BrokerRef>, RepositoryError> {
        let brokers = self.brokers.read().await;
        Ok(brokers.iter().filter(|(r, _)| r == realtor).map(|(_, b)| b.clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemoryChatHistoryRepository {
    turns: RwLock<HashMap<String, Vec<ChatTurn>>>,
}

impl InMemoryChatHistoryRepository {
    pub async fn all(&self, session: &SessionKey) -> Vec<ChatTurn> {
        self.turns.read().await.get(session.as_str()).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ChatHistoryRepository for InMemoryChatHistoryRepository {
    async fn recent(
        &self,
        session: &SessionKey,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, RepositoryError> {
        let turns = self.turns.read().await;
        let all = turns.get(session.as_str()).cloned().unwrap_or_default();
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }

    async fn append(&self, session: &SessionKey, turn: &ChatTurn) -> Result<(), RepositoryError> {
        let mut turns = self.turns.write().await;
        turns.entry(session.as_str().to_owned()).or_default().push(turn.clone());
        Ok(())
    }
}
