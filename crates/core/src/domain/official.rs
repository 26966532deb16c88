use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{BrokerId, ProjectId};
use crate::domain::stage::Stage;

/// Realtor identity shown to prospects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtorProfile {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Persona of the conversational bot for this realtor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotPersona {
    pub name: Option<String>,
    pub personality: Option<String>,
    pub tone: Option<String>,
}

/// Snapshot of the prospect record as the upstream normalization layer
/// resolved it before the pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectSnapshot {
    pub name: Option<String>,
    pub telephone: Option<String>,
    pub stage: Option<Stage>,
    pub vendor_id: Option<BrokerId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeUnit {
    Hours,
    Days,
}

/// One realtor-configured follow-up rule. When several rules exist the one
/// with `order == 1` wins, otherwise the first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FollowupRule {
    pub order: Option<u32>,
    pub range: f64,
    pub unit: RangeUnit,
}

impl FollowupRule {
    pub fn target_from(&self, base: DateTime<Utc>) -> DateTime<Utc> {
        let minutes = match self.unit {
            RangeUnit::Hours => self.range * 60.0,
            RangeUnit::Days => self.range * 24.0 * 60.0,
        };
        base + Duration::minutes(minutes.round() as i64)
    }
}

pub fn select_rule(rules: &[FollowupRule]) -> Option<&FollowupRule> {
    rules.iter().find(|rule| rule.order == Some(1)).or_else(|| rules.first())
}

/// Broker-side notification configuration. `no_response_disabled` mirrors
/// the realtor opting out of broker follow-ups entirely.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerNotificationsConfig {
    pub channel: Option<String>,
    pub no_response_disabled: bool,
    pub no_response_rule: Option<FollowupRule>,
}

/// Everything the upstream layer resolved about the conversation before the
/// pipeline starts: persona, prospect snapshot, known interests, and the
/// follow-up configuration the side-effect collector consumes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OfficialData {
    pub realtor: RealtorProfile,
    pub bot: BotPersona,
    pub prospect: Option<ProspectSnapshot>,
    pub properties_interested: Vec<InterestedProject>,
    pub mentioned_properties: Vec<ProjectId>,
    pub prospect_followup_rules: Vec<FollowupRule>,
    pub broker_notifications: BrokerNotificationsConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestedProject {
    pub id: ProjectId,
    pub name: String,
}
