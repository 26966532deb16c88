use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row};

use prospera_core::domain::ids::{ProjectId, RealtorId};
use prospera_core::domain::project::ProjectRef;

use super::{ProjectRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProjectRepository {
    pool: DbPool,
}

impl SqlProjectRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProjectRepository for SqlProjectRepository {
    async fn list_for_realtor(
        &self,
        realtor: &RealtorId,
    ) -> Result<Vec<ProjectRef>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, realtor_id, name FROM projects WHERE realtor_id = ? ORDER BY name",
        )
        .bind(&realtor.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(project_from_row).collect()
    }

    async fn filter_owned(
        &self,
        realtor: &RealtorId,
        ids: &[ProjectId],
    ) -> Result<Vec<ProjectRef>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::new("SELECT id, realtor_id, name FROM projects WHERE realtor_id = ");
        builder.push_bind(&realtor.0);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(&id.0);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(project_from_row).collect()
    }
}

fn project_from_row(row: &SqliteRow) -> Result<ProjectRef, RepositoryError> {
    Ok(ProjectRef {
        id: ProjectId(row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?),
        realtor_id: RealtorId(
            row.try_get("realtor_id").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        ),
        name: row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use prospera_core::domain::ids::{ProjectId, RealtorId};

    use super::SqlProjectRepository;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::ProjectRepository;

    async fn seeded_repo() -> SqlProjectRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        for (id, realtor, name) in [
            ("p-1", "r-1", "Mirador del Valle"),
            ("p-2", "r-1", "Altos de la Reina"),
            ("p-3", "r-2", "Parque Central"),
        ] {
            sqlx::query("INSERT INTO projects (id, realtor_id, name) VALUES (?, ?, ?)")
                .bind(id)
                .bind(realtor)
                .bind(name)
                .execute(&pool)
                .await
                .expect("seed project");
        }
        SqlProjectRepository::new(pool)
    }

    #[tokio::test]
    async fn filter_owned_excludes_other_tenants() {
        let repo = seeded_repo().await;
        let realtor = RealtorId("r-1".to_owned());

        let candidates = vec![
            ProjectId("p-1".to_owned()),
            ProjectId("p-3".to_owned()),
            ProjectId("p-404".to_owned()),
        ];
        let owned = repo.filter_owned(&realtor, &candidates).await.expect("filter");

        let ids: Vec<&str> = owned.iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, vec!["p-1"]);
    }

    #[tokio::test]
    async fn list_for_realtor_is_scoped() {
        let repo = seeded_repo().await;
        let catalog = repo.list_for_realtor(&RealtorId("r-1".to_owned())).await.expect("list");
        assert_eq!(catalog.len(), 2);
        assert!(catalog.iter().all(|p| p.realtor_id.0 == "r-1"));
    }
}
