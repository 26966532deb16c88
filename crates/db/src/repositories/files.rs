use sqlx::Row;

use prospera_core::domain::ids::ProjectId;
use prospera_core::domain::project::{FileType, ProjectFile};

use super::{ProjectFilesRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProjectFilesRepository {
    pool: DbPool,
}

impl SqlProjectFilesRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProjectFilesRepository for SqlProjectFilesRepository {
    async fn list(
        &self,
        project: &ProjectId,
        file_type: FileType,
    ) -> Result<Vec<ProjectFile>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT project_id, file_type, url FROM project_files \
             WHERE project_id = ? AND file_type = ? ORDER BY id",
        )
        .bind(&project.0)
        .bind(file_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let type_label: String = row
                    .try_get("file_type")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(ProjectFile {
                    project_id: ProjectId(
                        row.try_get("project_id")
                            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                    ),
                    file_type: type_label.parse().map_err(|_| {
                        RepositoryError::Decode(format!("unknown file type `{type_label}`"))
                    })?,
                    url: row.try_get("url").map_err(|e| RepositoryError::Decode(e.to_string()))?,
                })
            })
            .collect()
    }
}
