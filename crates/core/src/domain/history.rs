use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One prior conversation turn. Histories are ordered most-recent-last.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, text: text.into() }
    }
}

/// Last `limit` turns, preserving order. The pipeline uses a wide window for
/// classification and a narrow one for the response stage to bound prompt
/// size.
pub fn window(turns: &[ChatTurn], limit: usize) -> &[ChatTurn] {
    let start = turns.len().saturating_sub(limit);
    &turns[start..]
}

#[cfg(test)]
mod tests {
    use super::{window, ChatTurn};

    #[test]
    fn window_keeps_most_recent_turns() {
        let turns: Vec<ChatTurn> =
            (0..10).map(|i| ChatTurn::user(format!("mensaje {i}"))).collect();

        let trimmed = window(&turns, 6);
        assert_eq!(trimmed.len(), 6);
        assert_eq!(trimmed[0].text, "mensaje 4");
        assert_eq!(trimmed[5].text, "mensaje 9");
    }

    #[test]
    fn window_larger_than_history_is_identity() {
        let turns = vec![ChatTurn::user("hola"), ChatTurn::assistant("buenas")];
        assert_eq!(window(&turns, 30), turns.as_slice());
    }
}
