use chrono::Utc;
use sqlx::Row;

use prospera_core::domain::history::{ChatRole, ChatTurn};
use prospera_core::domain::ids::SessionKey;

use super::{ChatHistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlChatHistoryRepository {
    pool: DbPool,
}

impl SqlChatHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChatHistoryRepository for SqlChatHistoryRepository {
    async fn recent(
        &self,
        session: &SessionKey,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, message FROM chat_history WHERE session_key = ? \
             ORDER BY id DESC LIMIT ?",
        )
        .bind(session.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns: Vec<ChatTurn> = rows
            .iter()
            .map(|row| {
                let role_label: String =
                    row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let role = match role_label.as_str() {
                    "assistant" => ChatRole::Assistant,
                    "user" => ChatRole::User,
                    other => {
                        return Err(RepositoryError::Decode(format!("unknown role `{other}`")))
                    }
                };
                Ok(ChatTurn {
                    role,
                    text: row
                        .try_get("message")
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                })
            })
            .collect::<Result<_, _>>()?;

        turns.reverse();
        Ok(turns)
    }

    async fn append(&self, session: &SessionKey, turn: &ChatTurn) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_history (session_key, role, message, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(session.as_str())
        .bind(turn.role.as_str())
        .bind(&turn.text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use prospera_core::domain::history::ChatTurn;
    use prospera_core::domain::ids::SessionKey;

    use super::SqlChatHistoryRepository;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::ChatHistoryRepository;

    #[tokio::test]
    async fn recent_returns_windowed_turns_most_recent_last() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        let repo = SqlChatHistoryRepository::new(pool);
        let session = SessionKey("569:r-1".to_owned());

        for i in 0..8 {
            repo.append(&session, &ChatTurn::user(format!("mensaje {i}")))
                .await
                .expect("append");
        }

        let recent = repo.recent(&session, 3).await.expect("recent");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "mensaje 5");
        assert_eq!(recent[2].text, "mensaje 7");
    }
}
