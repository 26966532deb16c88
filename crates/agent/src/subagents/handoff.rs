use async_trait::async_trait;

use prospera_core::context::{HandoffReason, PipelineContext};
use prospera_core::errors::ApplicationError;
use prospera_core::filters::FilterSet;

use crate::subagents::SubAgent;

const CONTACT_REPLY: &str =
    "He contactado a un asesor humano para que te apoye. Te escribirán en breve.";
const OPT_OUT_REPLY: &str =
    "Entiendo, detendré los mensajes automáticos. Si necesitas algo más, estaré atento.";

/// Human hand-off and opt-out: pure context mutations, no model call.
///
/// Reads: filters. Writes: handoff, automation_allowed, reply_fragments.
/// When both filters fire, opt-out wins and the contact reply is not sent —
/// an opt-out must never page a salesperson.
#[derive(Clone, Copy, Debug, Default)]
pub struct HandoffAgent;

#[async_trait]
impl SubAgent for HandoffAgent {
    fn name(&self) -> &'static str {
        "handoff"
    }

    fn applies(&self, filters: &FilterSet) -> bool {
        filters.contact || filters.desinteres
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), ApplicationError> {
        if ctx.filters.desinteres {
            ctx.request_handoff(HandoffReason::Desinteres);
            ctx.automation_allowed = false;
            ctx.push_fragment(OPT_OUT_REPLY);
        } else if ctx.filters.contact {
            ctx.request_handoff(HandoffReason::ContactoHumano);
            ctx.push_fragment(CONTACT_REPLY);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use prospera_core::context::{HandoffReason, PipelineContext};
    use prospera_core::domain::ids::SessionKey;
    use prospera_core::domain::official::OfficialData;
    use prospera_core::domain::stage::Stage;
    use prospera_core::filters::FilterSet;

    use super::HandoffAgent;
    use crate::subagents::SubAgent;

    fn ctx() -> PipelineContext {
        PipelineContext::new(
            SessionKey("569:r-1".to_owned()),
            "mensaje".to_owned(),
            None,
            None,
            Vec::new(),
            Stage::Conversation,
            OfficialData::default(),
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        )
    }

    #[tokio::test]
    async fn contact_request_sets_handoff_with_canned_reply() {
        let mut ctx = ctx();
        ctx.filters = FilterSet { contact: true, ..FilterSet::default() };

        HandoffAgent.run(&mut ctx).await.expect("run");

        assert_eq!(ctx.handoff().unwrap().reason, HandoffReason::ContactoHumano);
        assert!(ctx.automation_allowed);
        assert!(ctx.reply_fragments[0].contains("asesor humano"));
    }

    #[tokio::test]
    async fn opt_out_disables_automation_and_wins_over_contact() {
        let mut ctx = ctx();
        ctx.filters = FilterSet { contact: true, desinteres: true, ..FilterSet::default() };

        HandoffAgent.run(&mut ctx).await.expect("run");

        assert_eq!(ctx.handoff().unwrap().reason, HandoffReason::Desinteres);
        assert!(!ctx.automation_allowed);
        assert_eq!(ctx.reply_fragments.len(), 1);
        assert!(ctx.reply_fragments[0].contains("detendré"));
    }
}
