use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use prospera_core::domain::ids::{BrokerId, ProspectId, RealtorId};
use prospera_core::domain::prospect::{Prospect, QualificationVariables};
use prospera_core::domain::stage::Stage;

use super::{ProspectRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProspectRepository {
    pool: DbPool,
}

impl SqlProspectRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProspectRepository for SqlProspectRepository {
    async fn find_by_phone(
        &self,
        realtor: &RealtorId,
        telephone: &str,
    ) -> Result<Option<Prospect>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, realtor_id, telephone, name, stage, vendor_id, forma_pago, \
             fecha_compra_estimativa, notas_adicionales, scheduled_at, created_at \
             FROM prospects WHERE realtor_id = ? AND telephone = ?",
        )
        .bind(&realtor.0)
        .bind(telephone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| prospect_from_row(&row)).transpose()
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

        sqlx::query(
            "INSERT INTO prospects (id, realtor_id, telephone, stage, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&prospect.id.0)
        .bind(&prospect.realtor_id.0)
        .bind(&prospect.telephone)
        .bind(prospect.stage.as_str())
        .bind(prospect.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(prospect)
    }

    async fn merge_qualification(
        &self,
        prospect: &ProspectId,
        incoming: &QualificationVariables,
        stage: Option<Stage>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT forma_pago, fecha_compra_estimativa, notas_adicionales \
             FROM prospects WHERE id = ?",
        )
        .bind(&prospect.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("prospect {}", prospect.0)))?;

        let mut merged = QualificationVariables {
            forma_pago: row.try_get("forma_pago").map_err(decode)?,
            fecha_compra_estimativa: row.try_get("fecha_compra_estimativa").map_err(decode)?,
            notas_adicionales: row.try_get("notas_adicionales").map_err(decode)?,
        };
        merged.merge_from(incoming);

        match stage {
            Some(stage) => {
                sqlx::query(
                    "UPDATE prospects SET forma_pago = ?, fecha_compra_estimativa = ?, \
                     notas_adicionales = ?, stage = ? WHERE id = ?",
                )
                .bind(&merged.forma_pago)
                .bind(&merged.fecha_compra_estimativa)
                .bind(&merged.notas_adicionales)
                .bind(stage.as_str())
                .bind(&prospect.0)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE prospects SET forma_pago = ?, fecha_compra_estimativa = ?, \
                     notas_adicionales = ? WHERE id = ?",
                )
                .bind(&merged.forma_pago)
                .bind(&merged.fecha_compra_estimativa)
                .bind(&merged.notas_adicionales)
                .bind(&prospect.0)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_visit(
        &self,
        prospect: &ProspectId,
        date: NaiveDate,
        stage: Stage,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE prospects SET scheduled_at = ?, stage = ? WHERE id = ?")
            .bind(date.format("%Y-%m-%d").to_string())
            .bind(stage.as_str())
            .bind(&prospect.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("prospect {}", prospect.0)));
        }
        Ok(())
    }

    async fn assign_vendor(
        &self,
        prospect: &ProspectId,
        broker: &BrokerId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE prospects SET vendor_id = ? WHERE id = ? AND vendor_id IS NULL")
                .bind(&broker.0)
                .bind(&prospect.0)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn prospect_from_row(row: &SqliteRow) -> Result<Prospect, RepositoryError> {
    let stage_label: String = row.try_get("stage").map_err(decode)?;
    let stage: Stage = stage_label
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unknown stage `{stage_label}`")))?;

    let scheduled_at: Option<String> = row.try_get("scheduled_at").map_err(decode)?;
    let scheduled_at = scheduled_at
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| RepositoryError::Decode(format!("bad scheduled_at `{raw}`")))
        })
        .transpose()?;

    let created_raw: String = row.try_get("created_at").map_err(decode)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|_| RepositoryError::Decode(format!("bad created_at `{created_raw}`")))?
        .with_timezone(&Utc);

    Ok(Prospect {
        id: ProspectId(row.try_get("id").map_err(decode)?),
        realtor_id: RealtorId(row.try_get("realtor_id").map_err(decode)?),
        telephone: row.try_get("telephone").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        stage,
        vendor_id: row
            .try_get::<Option<String>, _>("vendor_id")
            .map_err(decode)?
            .map(BrokerId),
        qualification: QualificationVariables {
            forma_pago: row.try_get("forma_pago").map_err(decode)?,
            fecha_compra_estimativa: row.try_get("fecha_compra_estimativa").map_err(decode)?,
            notas_adicionales: row.try_get("notas_adicionales").map_err(decode)?,
        },
        scheduled_at,
        created_at,
    })
}

fn decode(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use prospera_core::domain::ids::{BrokerId, RealtorId};
    use prospera_core::domain::prospect::QualificationVariables;
    use prospera_core::domain::stage::Stage;

    use super::SqlProspectRepository;
    use crate::migrations::run_pending;
    use crate::repositories::ProspectRepository;
    use crate::connect_with_settings;

    async fn repo() -> SqlProspectRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlProspectRepository::new(pool)
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let repo = repo().await;
        let realtor = RealtorId("r-1".to_owned());

        let created = repo.create(&realtor, "56911112222").await.expect("create");
        let found = repo
            .find_by_phone(&realtor, "56911112222")
            .await
            .expect("find")
            .expect("present");

        assert_eq!(found.id, created.id);
        assert_eq!(found.stage, Stage::NewProspect);
        assert!(found.vendor_id.is_none());
        assert!(found.qualification.is_empty());
    }

    #[tokio::test]
    async fn merge_preserves_stored_fields() {
        let repo = repo().await;
        let realtor = RealtorId("r-1".to_owned());
        let prospect = repo.create(&realtor, "56911112222").await.expect("create");

        let first = QualificationVariables {
            forma_pago: "contado".to_owned(),
            ..QualificationVariables::default()
        };
        repo.merge_qualification(&prospect.id, &first, None).await.expect("merge 1");

        let second = QualificationVariables {
            fecha_compra_estimativa: "2024-07-01".to_owned(),
            ..QualificationVariables::default()
        };
        repo.merge_qualification(&prospect.id, &second, Some(Stage::Qualified))
            .await
            .expect("merge 2");

        let stored = repo
            .find_by_phone(&realtor, "56911112222")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.qualification.forma_pago, "contado");
        assert_eq!(stored.qualification.fecha_compra_estimativa, "2024-07-01");
        assert_eq!(stored.stage, Stage::Qualified);
    }

    #[tokio::test]
    async fn vendor_assignment_is_idempotent() {
        let repo = repo().await;
        let realtor = RealtorId("r-1".to_owned());
        let prospect = repo.create(&realtor, "56911112222").await.expect("create");

        let first = repo
            .assign_vendor(&prospect.id, &BrokerId("b-1".to_owned()))
            .await
            .expect("assign");
        let second = repo
            .assign_vendor(&prospect.id, &BrokerId("b-2".to_owned()))
            .await
            .expect("assign again");

        assert!(first);
        assert!(!second);

        let stored = repo
            .find_by_phone(&realtor, "56911112222")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.vendor_id, Some(BrokerId("b-1".to_owned())));
    }

    #[tokio::test]
    async fn record_visit_advances_stage() {
        let repo = repo().await;
        let realtor = RealtorId("r-1".to_owned());
        let prospect = repo.create(&realtor, "56911112222").await.expect("create");

        let date = NaiveDate::from_ymd_opt(2024, 6, 17).unwrap();
        repo.record_visit(&prospect.id, date, Stage::Scheduled).await.expect("visit");

        let stored = repo
            .find_by_phone(&realtor, "56911112222")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.scheduled_at, Some(date));
        assert_eq!(stored.stage, Stage::Scheduled);
    }
}
