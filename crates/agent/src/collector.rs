use std::sync::Arc;

use chrono::{DateTime, Utc};

use prospera_core::context::{HandoffReason, PipelineContext};
use prospera_core::domain::official::{select_rule, FollowupRule};
use prospera_core::effects::{
    AssignmentReason, BrokerAssignment, FollowupDirective, FollowupKind, NotificationKind,
    NotificationPayload,
};
use prospera_db::repositories::{BrokerRepository, FollowupRepository, ProspectRepository};

/// Post-pipeline side effects: follow-up rescheduling, idempotent broker
/// assignment on hand-off, and notification payloads for out-of-band
/// delivery. Runs after every sub-agent; persistence failures degrade to
/// logged decisions, never into the reply path.
pub struct SideEffectCollector {
    prospects: Arc<dyn ProspectRepository>,
    brokers: Arc<dyn BrokerRepository>,
    followups: Arc<dyn FollowupRepository>,
}

impl SideEffectCollector {
    pub fn new(
        prospects: Arc<dyn ProspectRepository>,
        brokers: Arc<dyn BrokerRepository>,
        followups: Arc<dyn FollowupRepository>,
    ) -> Self {
        Self { prospects, brokers, followups }
    }

    pub async fn run(&self, ctx: &mut PipelineContext, now: DateTime<Utc>) {
        self.schedule_followups(ctx, now).await;
        self.assign_broker(ctx).await;
        build_notifications(ctx, now);
    }

    async fn schedule_followups(&self, ctx: &mut PipelineContext, now: DateTime<Utc>) {
        let (Some(prospect), Some(realtor)) = (ctx.prospect_id.clone(), ctx.realtor_id.clone())
        else {
            return;
        };

        let prospect_rule = select_rule(&ctx.official.prospect_followup_rules).cloned();
        if let Some(rule) = prospect_rule {
            if let Some(directive) = self
                .replace_followup(&prospect, &realtor, FollowupKind::Prospect, &rule, now)
                .await
            {
                ctx.side_effects.followups.push(directive);
            }
        }

        let broker_config = &ctx.official.broker_notifications;
        if !broker_config.no_response_disabled {
            if let Some(rule) = broker_config.no_response_rule.clone() {
                if let Some(directive) = self
                    .replace_followup(&prospect, &realtor, FollowupKind::Broker, &rule, now)
                    .await
                {
                    ctx.side_effects.followups.push(directive);
                }
            }
        }
    }

    /// Replace-not-stack: any pending follow-up of the same kind is removed
    /// before the new one is created.
    async fn replace_followup(
        &self,
        prospect: &prospera_core::domain::ids::ProspectId,
        realtor: &prospera_core::domain::ids::RealtorId,
        kind: FollowupKind,
        rule: &FollowupRule,
        now: DateTime<Utc>,
    ) -> Option<FollowupDirective> {
        let scheduled_at = rule.target_from(now);

        let pending = match self.followups.list_open(prospect, realtor, kind).await {
            Ok(pending) => pending,
            Err(error) => {
                tracing::error!(error = %error, kind = kind.as_str(), "follow-up listing failed");
                return None;
            }
        };

        let pending_ids: Vec<String> = pending.into_iter().map(|record| record.id).collect();
        if let Err(error) = self.followups.delete(&pending_ids).await {
            tracing::error!(error = %error, kind = kind.as_str(), "follow-up cleanup failed");
            return None;
        }

        match self.followups.create(prospect, realtor, kind, scheduled_at).await {
            Ok(_) => Some(FollowupDirective {
                kind,
                prospect_id: prospect.clone(),
                realtor_id: realtor.clone(),
                scheduled_at,
                replaced: pending_ids.len(),
            }),
            Err(error) => {
                tracing::error!(error = %error, kind = kind.as_str(), "follow-up creation failed");
                None
            }
        }
    }

    async fn assign_broker(&self, ctx: &mut PipelineContext) {
        let Some(handoff) = ctx.handoff() else {
            return;
        };
        // Opt-out must never page a salesperson.
        if handoff.reason == HandoffReason::Desinteres {
            return;
        }

        let (Some(prospect), Some(realtor)) = (ctx.prospect_id.clone(), ctx.realtor_id.clone())
        else {
            ctx.side_effects.broker_assignment =
                Some(BrokerAssignment::skipped(AssignmentReason::MissingIdentifiers));
            return;
        };

        let already_assigned = ctx
            .official
            .prospect
            .as_ref()
            .map(|snapshot| snapshot.vendor_id.is_some())
            .unwrap_or(false);
        if already_assigned {
            ctx.side_effects.broker_assignment =
                Some(BrokerAssignment::skipped(AssignmentReason::AlreadyAssigned));
            return;
        }

        let brokers = match self.brokers.list_active(&realtor).await {
            Ok(brokers) => brokers,
            Err(error) => {
                tracing::error!(error = %error, "active broker listing failed");
                ctx.side_effects.broker_assignment =
                    Some(BrokerAssignment::skipped(AssignmentReason::StoreError));
                return;
            }
        };

        let Some(selected) = brokers.into_iter().next() else {
            ctx.side_effects.broker_assignment =
                Some(BrokerAssignment::skipped(AssignmentReason::NoActiveBrokers));
            return;
        };

        ctx.side_effects.broker_assignment =
            match self.prospects.assign_vendor(&prospect, &selected.id).await {
                Ok(true) => Some(BrokerAssignment {
                    performed: true,
                    reason: AssignmentReason::Assigned,
                    broker: Some(selected),
                }),
                Ok(false) => Some(BrokerAssignment {
                    performed: false,
                    reason: AssignmentReason::AlreadyAssigned,
                    broker: Some(selected),
                }),
                Err(error) => {
                    tracing::error!(error = %error, "vendor assignment failed");
                    Some(BrokerAssignment::skipped(AssignmentReason::StoreError))
                }
            };
    }
}

fn build_notifications(ctx: &mut PipelineContext, now: DateTime<Utc>) {
    let reason = ctx.handoff().map(|handoff| handoff.reason);
    let channel = ctx
        .official
        .broker_notifications
        .channel
        .clone()
        .unwrap_or_else(|| "internal".to_owned());
    let snapshot = ctx.official.prospect.clone().unwrap_or_default();

    let base = |kind: NotificationKind| NotificationPayload {
        event_id: NotificationPayload::event_id(),
        kind,
        timestamp: now,
        channel: channel.clone(),
        realtor_id: ctx.realtor_id.clone(),
        realtor_name: ctx.official.realtor.name.clone(),
        prospect_id: ctx.prospect_id.clone(),
        prospect_name: snapshot.name.clone(),
        prospect_telephone: snapshot.telephone.clone(),
        message: ctx.message.clone(),
        stage: ctx.stage,
        handoff_reason: reason.map(|reason| reason.as_str().to_owned()),
        vendor: None,
    };

    let mut notifications = Vec::new();

    let contact_handoff = ctx.filters.contact
        || matches!(reason, Some(HandoffReason::ContactoHumano | HandoffReason::Clasificador));
    if contact_handoff && reason != Some(HandoffReason::Desinteres) {
        let mut payload = base(NotificationKind::BrokerHandoff);
        payload.vendor = ctx
            .side_effects
            .broker_assignment
            .as_ref()
            .and_then(|assignment| assignment.broker.clone());
        notifications.push(payload);
    }

    if ctx.filters.desinteres || reason == Some(HandoffReason::Desinteres) {
        notifications.push(base(NotificationKind::ProspectOptOut));
    }

    ctx.side_effects.notifications.extend(notifications);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone, Utc};

    use prospera_core::context::{HandoffReason, PipelineContext};
    use prospera_core::domain::ids::{BrokerId, ProspectId, RealtorId, SessionKey};
    use prospera_core::domain::official::{
        BrokerNotificationsConfig, FollowupRule, OfficialData, ProspectSnapshot, RangeUnit,
    };
    use prospera_core::domain::stage::Stage;
    use prospera_core::effects::{AssignmentReason, BrokerRef, FollowupKind, NotificationKind};
    use prospera_core::filters::FilterSet;
    use prospera_db::repositories::{
        FollowupRepository, InMemoryBrokerRepository, InMemoryFollowupRepository,
        InMemoryProspectRepository, ProspectRepository,
    };

    use super::SideEffectCollector;

    struct Fixture {
        collector: SideEffectCollector,
        prospects: Arc<InMemoryProspectRepository>,
        followups: Arc<InMemoryFollowupRepository>,
        prospect_id: ProspectId,
    }

    async fn fixture(with_brokers: bool) -> Fixture {
        let prospects = Arc::new(InMemoryProspectRepository::default());
        let prospect =
            prospects.create(&RealtorId("r-1".to_owned()), "56911112222").await.expect("create");

        let brokers = Arc::new(InMemoryBrokerRepository::default());
        if with_brokers {
            for (id, name) in [("b-1", "Andrés"), ("b-2", "Carla")] {
                brokers
                    .insert(
                        RealtorId("r-1".to_owned()),
                        BrokerRef {
                            id: BrokerId(id.to_owned()),
                            name: Some(name.to_owned()),
                            email: None,
                            telephone: Some("+56922223333".to_owned()),
                        },
                    )
                    .await;
            }
        }

        let followups = Arc::new(InMemoryFollowupRepository::default());
        Fixture {
            collector: SideEffectCollector::new(prospects.clone(), brokers, followups.clone()),
            prospects,
            followups,
            prospect_id: prospect.id,
        }
    }

    fn ctx(prospect: ProspectId, official: OfficialData) -> PipelineContext {
        PipelineContext::new(
            SessionKey("56911112222:r-1".to_owned()),
            "Quiero hablar con un asesor".to_owned(),
            Some(RealtorId("r-1".to_owned())),
            Some(prospect),
            Vec::new(),
            Stage::Conversation,
            official,
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        )
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn contact_handoff_assigns_first_active_broker() {
        let fixture = fixture(true).await;
        let mut ctx = ctx(fixture.prospect_id.clone(), OfficialData::default());
        ctx.filters = FilterSet { contact: true, ..FilterSet::default() };
        ctx.request_handoff(HandoffReason::ContactoHumano);

        fixture.collector.run(&mut ctx, now()).await;

        let assignment = ctx.side_effects.broker_assignment.expect("assignment");
        assert!(assignment.performed);
        assert_eq!(assignment.broker.as_ref().unwrap().id.0, "b-1");

        let stored = fixture.prospects.get(&fixture.prospect_id).await.expect("stored");
        assert_eq!(stored.vendor_id, Some(BrokerId("b-1".to_owned())));

        let kinds: Vec<NotificationKind> =
            ctx.side_effects.notifications.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::BrokerHandoff]);
        assert!(ctx.side_effects.notifications[0].vendor.is_some());
    }

    #[tokio::test]
    async fn opt_out_never_assigns_a_broker() {
        let fixture = fixture(true).await;
        let mut ctx = ctx(fixture.prospect_id.clone(), OfficialData::default());
        ctx.filters = FilterSet { desinteres: true, ..FilterSet::default() };
        ctx.request_handoff(HandoffReason::Desinteres);

        fixture.collector.run(&mut ctx, now()).await;

        assert!(ctx.side_effects.broker_assignment.is_none());
        assert!(fixture
            .prospects
            .get(&fixture.prospect_id)
            .await
            .expect("stored")
            .vendor_id
            .is_none());

        let kinds: Vec<NotificationKind> =
            ctx.side_effects.notifications.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::ProspectOptOut]);
    }

    #[tokio::test]
    async fn preassigned_vendor_is_never_reassigned() {
        let fixture = fixture(true).await;
        let official = OfficialData {
            prospect: Some(ProspectSnapshot {
                vendor_id: Some(BrokerId("b-7".to_owned())),
                ..ProspectSnapshot::default()
            }),
            ..OfficialData::default()
        };
        let mut ctx = ctx(fixture.prospect_id.clone(), official);
        ctx.request_handoff(HandoffReason::ContactoHumano);

        fixture.collector.run(&mut ctx, now()).await;

        let assignment = ctx.side_effects.broker_assignment.expect("assignment");
        assert!(!assignment.performed);
        assert_eq!(assignment.reason, AssignmentReason::AlreadyAssigned);
    }

    #[tokio::test]
    async fn no_active_brokers_is_recorded() {
        let fixture = fixture(false).await;
        let mut ctx = ctx(fixture.prospect_id.clone(), OfficialData::default());
        ctx.request_handoff(HandoffReason::ContactoHumano);

        fixture.collector.run(&mut ctx, now()).await;

        let assignment = ctx.side_effects.broker_assignment.expect("assignment");
        assert_eq!(assignment.reason, AssignmentReason::NoActiveBrokers);
    }

    #[tokio::test]
    async fn followups_replace_pending_ones_of_the_same_kind() {
        let fixture = fixture(false).await;
        let realtor = RealtorId("r-1".to_owned());

        // A stale follow-up from a previous run.
        fixture
            .followups
            .create(&fixture.prospect_id, &realtor, FollowupKind::Prospect, now())
            .await
            .expect("stale followup");

        let official = OfficialData {
            prospect_followup_rules: vec![FollowupRule {
                order: Some(1),
                range: 4.0,
                unit: RangeUnit::Hours,
            }],
            broker_notifications: BrokerNotificationsConfig {
                channel: None,
                no_response_disabled: false,
                no_response_rule: Some(FollowupRule {
                    order: None,
                    range: 1.0,
                    unit: RangeUnit::Days,
                }),
            },
            ..OfficialData::default()
        };
        let mut ctx = ctx(fixture.prospect_id.clone(), official);

        fixture.collector.run(&mut ctx, now()).await;

        assert_eq!(ctx.side_effects.followups.len(), 2);
        let prospect_directive = &ctx.side_effects.followups[0];
        assert_eq!(prospect_directive.kind, FollowupKind::Prospect);
        assert_eq!(prospect_directive.replaced, 1);
        assert_eq!(
            prospect_directive.scheduled_at,
            Utc.with_ymd_and_hms(2024, 6, 10, 16, 0, 0).unwrap()
        );

        let open = fixture
            .followups
            .list_open(&fixture.prospect_id, &realtor, FollowupKind::Prospect)
            .await
            .expect("open");
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn disabled_broker_followups_are_skipped() {
        let fixture = fixture(false).await;
        let official = OfficialData {
            broker_notifications: BrokerNotificationsConfig {
                channel: None,
                no_response_disabled: true,
                no_response_rule: Some(FollowupRule {
                    order: None,
                    range: 2.0,
                    unit: RangeUnit::Hours,
                }),
            },
            ..OfficialData::default()
        };
        let mut ctx = ctx(fixture.prospect_id.clone(), official);

        fixture.collector.run(&mut ctx, now()).await;

        assert!(ctx.side_effects.followups.is_empty());
    }
}
