use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::ids::{BrokerId, ProspectId, RealtorId};
use crate::domain::stage::Stage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupKind {
    Prospect,
    Broker,
}

impl FollowupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowupKind::Prospect => "prospect",
            FollowupKind::Broker => "broker",
        }
    }
}

/// A follow-up the collector scheduled, replacing any pending follow-up of
/// the same kind rather than stacking duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FollowupDirective {
    pub kind: FollowupKind,
    pub prospect_id: ProspectId,
    pub realtor_id: RealtorId,
    pub scheduled_at: DateTime<Utc>,
    pub replaced: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentReason {
    Assigned,
    AlreadyAssigned,
    MissingIdentifiers,
    NoActiveBrokers,
    StoreError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BrokerRef {
    pub id: BrokerId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
}

/// Outcome of the hand-off broker auto-assignment. Never reassigns: when a
/// vendor is already linked the decision records `AlreadyAssigned`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BrokerAssignment {
    pub performed: bool,
    pub reason: AssignmentReason,
    pub broker: Option<BrokerRef>,
}

impl BrokerAssignment {
    pub fn skipped(reason: AssignmentReason) -> Self {
        Self { performed: false, reason, broker: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BrokerHandoff,
    ProspectOptOut,
}

/// Out-of-band notification built for each hand-off/opt-out event, carrying
/// enough prospect/realtor context for external delivery.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub event_id: String,
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub realtor_id: Option<RealtorId>,
    pub realtor_name: Option<String>,
    pub prospect_id: Option<ProspectId>,
    pub prospect_name: Option<String>,
    pub prospect_telephone: Option<String>,
    pub message: String,
    pub stage: Stage,
    pub handoff_reason: Option<String>,
    pub vendor: Option<BrokerRef>,
}

impl NotificationPayload {
    pub fn event_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Accumulated persistence/notification directives for one pipeline run,
/// executed by the collector after the sub-agents complete.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SideEffects {
    pub followups: Vec<FollowupDirective>,
    pub broker_assignment: Option<BrokerAssignment>,
    pub notifications: Vec<NotificationPayload>,
}

#[cfg(test)]
mod tests {
    use super::{AssignmentReason, BrokerAssignment, FollowupKind};

    #[test]
    fn skipped_assignment_carries_reason() {
        let assignment = BrokerAssignment::skipped(AssignmentReason::NoActiveBrokers);
        assert!(!assignment.performed);
        assert_eq!(assignment.reason, AssignmentReason::NoActiveBrokers);
        assert!(assignment.broker.is_none());
    }

    #[test]
    fn followup_kinds_have_stable_labels() {
        assert_eq!(FollowupKind::Prospect.as_str(), "prospect");
        assert_eq!(FollowupKind::Broker.as_str(), "broker");
    }
}
