use chrono::Utc;
use sqlx::{QueryBuilder, Row};

use prospera_core::domain::ids::{ProjectId, ProspectId};

use super::{InterestRepository, RepositoryError};
use crate::DbPool;

pub struct SqlInterestRepository {
    pool: DbPool,
}

impl SqlInterestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InterestRepository for SqlInterestRepository {
    async fn linked_ids(&self, prospect: &ProspectId) -> Result<Vec<ProjectId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT project_id FROM prospect_project_interests WHERE prospect_id = ? \
             ORDER BY created_at, project_id",
        )
        .bind(&prospect.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("project_id")
                    .map(ProjectId)
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }

    async fn link(&self, prospect: &ProspectId, ids: &[ProjectId]) -> Result<(), RepositoryError> {
        if ids.is_empty() {
            return Ok(());
        }

        let created_at = Utc::now().to_rfc3339();
        let mut builder = QueryBuilder::new(
            "INSERT OR IGNORE INTO prospect_project_interests \
             (prospect_id, project_id, created_at) ",
        );
        builder.push_values(ids, |mut row, id| {
            row.push_bind(&prospect.0).push_bind(&id.0).push_bind(&created_at);
        });
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn unlink(
        &self,
        prospect: &ProspectId,
        ids: &[ProjectId],
    ) -> Result<Vec<ProjectId>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let linked = self.linked_ids(prospect).await?;
        let removable: Vec<ProjectId> =
            ids.iter().filter(|id| linked.contains(id)).cloned().collect();
        if removable.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::new("DELETE FROM prospect_project_interests WHERE prospect_id = ");
        builder.push_bind(&prospect.0);
        builder.push(" AND project_id IN (");
        let mut separated = builder.separated(", ");
        for id in &removable {
            separated.push_bind(&id.0);
        }
        separated.push_unseparated(")");
        builder.build().execute(&self.pool).await?;

        Ok(removable)
    }
}
