use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use prospera_core::domain::ids::{ProspectId, RealtorId};
use prospera_core::effects::FollowupKind;

use super::{FollowupRecord, FollowupRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFollowupRepository {
    pool: DbPool,
}

impl SqlFollowupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FollowupRepository for SqlFollowupRepository {
    async fn list_open(
        &self,
        prospect: &ProspectId,
        realtor: &RealtorId,
        kind: FollowupKind,
    ) -> Result<Vec<FollowupRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, kind, scheduled_at FROM followups \
             WHERE prospect_id = ? AND realtor_id = ? AND kind = ? AND status = 'open' \
             ORDER BY created_at",
        )
        .bind(&prospect.0)
        .bind(&realtor.0)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw: String = row
                    .try_get("scheduled_at")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let scheduled_at = DateTime::parse_from_rfc3339(&raw)
                    .map_err(|_| RepositoryError::Decode(format!("bad scheduled_at `{raw}`")))?
                    .with_timezone(&Utc);
                Ok(FollowupRecord {
                    id: row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?,
                    kind,
                    scheduled_at,
                })
            })
            .collect()
    }

    async fn delete(&self, ids: &[String]) -> Result<(), RepositoryError> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::new("DELETE FROM followups WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn create(
        &self,
        prospect: &ProspectId,
        realtor: &RealtorId,
        kind: FollowupKind,
        scheduled_at: DateTime<Utc>,
    ) -> Result<FollowupRecord, RepositoryError> {
        let record =
            FollowupRecord { id: Uuid::new_v4().to_string(), kind, scheduled_at };

        sqlx::query(
            "INSERT INTO followups (id, prospect_id, realtor_id, kind, scheduled_at, status, \
             created_at) VALUES (?, ?, ?, ?, ?, 'open', ?)",
        )
        .bind(&record.id)
        .bind(&prospect.0)
        .bind(&realtor.0)
        .bind(kind.as_str())
        .bind(scheduled_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use prospera_core::domain::ids::{ProspectId, RealtorId};
    use prospera_core::effects::FollowupKind;

    use super::SqlFollowupRepository;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::FollowupRepository;

    #[tokio::test]
    async fn open_followups_are_scoped_by_kind() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        let repo = SqlFollowupRepository::new(pool);

        let prospect = ProspectId("pr-1".to_owned());
        let realtor = RealtorId("r-1".to_owned());
        let when = Utc::now() + Duration::hours(4);

        repo.create(&prospect, &realtor, FollowupKind::Prospect, when).await.expect("create");
        repo.create(&prospect, &realtor, FollowupKind::Broker, when).await.expect("create");

        let open =
            repo.list_open(&prospect, &realtor, FollowupKind::Prospect).await.expect("list");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, FollowupKind::Prospect);

        let ids: Vec<String> = open.into_iter().map(|record| record.id).collect();
        repo.delete(&ids).await.expect("delete");
        assert!(repo
            .list_open(&prospect, &realtor, FollowupKind::Prospect)
            .await
            .expect("list")
            .is_empty());
    }
}
