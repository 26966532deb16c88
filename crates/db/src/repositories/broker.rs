use sqlx::Row;

use prospera_core::domain::ids::{BrokerId, RealtorId};
use prospera_core::effects::BrokerRef;

use super::{BrokerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBrokerRepository {
    pool: DbPool,
}

impl SqlBrokerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BrokerRepository for SqlBrokerRepository {
    async fn list_active(&self, realtor: &RealtorId) -> Result<Vec<BrokerRef>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, email, telephone FROM brokers \
             WHERE realtor_id = ? AND active = 1 ORDER BY created_at, id",
        )
        .bind(&realtor.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(BrokerRef {
                    id: BrokerId(
                        row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?,
                    ),
                    name: row
                        .try_get("name")
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                    email: row
                        .try_get("email")
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                    telephone: row
                        .try_get("telephone")
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use prospera_core::domain::ids::RealtorId;

    use super::SqlBrokerRepository;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::BrokerRepository;

    #[tokio::test]
    async fn only_active_brokers_are_listed_in_stable_order() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        for (id, name, active, created) in [
            ("b-2", "Carla", 1, "2024-01-02T00:00:00Z"),
            ("b-1", "Andrés", 1, "2024-01-01T00:00:00Z"),
            ("b-3", "Inactivo", 0, "2023-12-01T00:00:00Z"),
        ] {
            sqlx::query(
                "INSERT INTO brokers (id, realtor_id, name, active, created_at) \
                 VALUES (?, 'r-1', ?, ?, ?)",
            )
            .bind(id)
            .bind(name)
            .bind(active)
            .bind(created)
            .execute(&pool)
            .await
            .expect("seed broker");
        }

        let repo = SqlBrokerRepository::new(pool);
        let brokers = repo.list_active(&RealtorId("r-1".to_owned())).await.expect("list");

        let ids: Vec<&str> = brokers.iter().map(|b| b.id.0.as_str()).collect();
        assert_eq!(ids, vec!["b-1", "b-2"]);
    }
}
