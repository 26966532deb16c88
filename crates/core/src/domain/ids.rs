use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RealtorId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProspectId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrokerId(pub String);

/// Stable conversation identifier. The same (phone, realtor) pair always
/// produces the same key, regardless of how the transport formatted the
/// sender address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn from_parts(telephone: &str, realtor: &RealtorId) -> Option<Self> {
        let phone = clean_phone(telephone)?;
        Some(Self(format!("{phone}:{}", realtor.0)))
    }

    pub fn anonymous() -> Self {
        Self("anonymous".to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn clean_phone(raw: &str) -> Option<String> {
    let mut number = raw.trim();
    if let Some((prefix, _)) = number.split_once('@') {
        number = prefix;
    }
    let number = number.strip_prefix('+').unwrap_or(number).trim();
    if number.is_empty() {
        None
    } else {
        Some(number.to_owned())
    }
}
