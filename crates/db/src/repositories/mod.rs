use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use prospera_core::domain::history::ChatTurn;
use prospera_core::domain::ids::{BrokerId, ProjectId, ProspectId, RealtorId, SessionKey};
use prospera_core::domain::project::{FileType, ProjectFile, ProjectRef};
use prospera_core::domain::prospect::{Prospect, QualificationVariables};
use prospera_core::domain::stage::Stage;
use prospera_core::effects::{BrokerRef, FollowupKind};

pub mod broker;
pub mod files;
pub mod followup;
pub mod history;
pub mod interest;
pub mod memory;
pub mod project;
pub mod prospect;

pub use broker::SqlBrokerRepository;
pub use files::SqlProjectFilesRepository;
pub use followup::SqlFollowupRepository;
pub use history::SqlChatHistoryRepository;
pub use interest::SqlInterestRepository;
pub use memory::{
    InMemoryBrokerRepository, InMemoryChatHistoryRepository, InMemoryFollowupRepository,
    InMemoryInterestRepository, InMemoryProjectFilesRepository, InMemoryProjectRepository,
    InMemoryProspectRepository,
};
pub use project::SqlProjectRepository;
pub use prospect::SqlProspectRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait ProspectRepository: Send + Sync {
    async fn find_by_phone(
        &self,
        realtor: &RealtorId,
        telephone: &str,
    ) -> Result<Option<Prospect>, RepositoryError>;

    async fn create(
        &self,
        realtor: &RealtorId,
        telephone: &str,
    ) -> Result<Prospect, RepositoryError>;

    /// Field-level merge of qualification variables. Stage is updated only
    /// when one was resolved. The read-merge-write happens inside a single
    /// store transaction so concurrent merges cannot lose fields.
    async fn merge_qualification(
        &self,
        prospect: &ProspectId,
        incoming: &QualificationVariables,
        stage: Option<Stage>,
    ) -> Result<(), RepositoryError>;

    async fn record_visit(
        &self,
        prospect: &ProspectId,
        date: NaiveDate,
        stage: Stage,
    ) -> Result<(), RepositoryError>;

    /// Assign a vendor only when none is linked yet. Returns whether the
    /// assignment took effect.
    async fn assign_vendor(
        &self,
        prospect: &ProspectId,
        broker: &BrokerId,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn list_for_realtor(
        &self,
        realtor: &RealtorId,
    ) -> Result<Vec<ProjectRef>, RepositoryError>;

    /// Restrict candidate ids to projects owned by the realtor. Tenant
    /// isolation for interest linking.
    async fn filter_owned(
        &self,
        realtor: &RealtorId,
        ids: &[ProjectId],
    ) -> Result<Vec<ProjectRef>, RepositoryError>;
}

#[async_trait]
pub trait InterestRepository: Send + Sync {
    async fn linked_ids(&self, prospect: &ProspectId) -> Result<Vec<ProjectId>, RepositoryError>;

    async fn link(&self, prospect: &ProspectId, ids: &[ProjectId]) -> Result<(), RepositoryError>;

    /// Remove links, returning the ids that were actually removed.
    async fn unlink(
        &self,
        prospect: &ProspectId,
        ids: &[ProjectId],
    ) -> Result<Vec<ProjectId>, RepositoryError>;
}

#[async_trait]
pub trait ProjectFilesRepository: Send + Sync {
    async fn list(
        &self,
        project: &ProjectId,
        file_type: FileType,
    ) -> Result<Vec<ProjectFile>, RepositoryError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowupRecord {
    pub id: String,
    pub kind: FollowupKind,
    pub scheduled_at: DateTime<Utc>,
}

#[async_trait]
pub trait FollowupRepository: Send + Sync {
    async fn list_open(
        &self,
        prospect: &ProspectId,
        realtor: &RealtorId,
        kind: FollowupKind,
    ) -> Result<Vec<FollowupRecord>, RepositoryError>;

    async fn delete(&self, ids: &[String]) -> Result<(), RepositoryError>;

    async fn create(
        &self,
        prospect: &ProspectId,
        realtor: &RealtorId,
        kind: FollowupKind,
        scheduled_at: DateTime<Utc>,
    ) -> Result<FollowupRecord, RepositoryError>;
}

#[async_trait]
pub trait BrokerRepository: Send + Sync {
    /// Active brokers in stable (created_at, id) order; the collector takes
    /// the first.
    async fn list_active(&self, realtor: &RealtorId) -> Result<Vec<BrokerRef>, RepositoryError>;
}

#[async_trait]
pub trait ChatHistoryRepository: Send + Sync {
    /// Last `limit` turns for the session, most-recent-last.
    async fn recent(
        &self,
        session: &SessionKey,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, RepositoryError>;

    async fn append(&self, session: &SessionKey, turn: &ChatTurn) -> Result<(), RepositoryError>;
}
