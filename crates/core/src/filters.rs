use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::intent::Intent;
use crate::domain::stage::Stage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    StageNotAllowed,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::StageNotAllowed => "stage_not_allowed",
        }
    }
}

/// Capability flags for one pipeline run. A fixed struct rather than a map:
/// every resolution yields all seven flags, and unknown filter names cannot
/// exist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterSet {
    pub rag: bool,
    pub intention: bool,
    pub calification: bool,
    pub schedule: bool,
    pub files: bool,
    pub contact: bool,
    pub desinteres: bool,
    pub calification_block_reason: Option<BlockReason>,
    pub schedule_block_reason: Option<BlockReason>,
}

impl FilterSet {
    /// Pure and total mapping from (intents, stage) to capability flags.
    ///
    /// Qualification only runs mid-conversation or once qualified;
    /// scheduling only once qualified. A gate that suppresses an otherwise
    /// active filter records its reason for observability.
    pub fn resolve(intents: &BTreeSet<Intent>, stage: Stage) -> Self {
        let mut filters = FilterSet {
            rag: intents.contains(&Intent::BusquedaInformacion)
                || intents.contains(&Intent::PideFotosPlanoVideos),
            intention: intents.contains(&Intent::AnotarProyecto),
            calification: intents.contains(&Intent::FormaPago)
                || intents.contains(&Intent::FechaCompra),
            schedule: intents.contains(&Intent::FechaVisita),
            files: intents.contains(&Intent::EnviarArchivos)
                || intents.contains(&Intent::PideFotosPlanoVideos),
            contact: intents.contains(&Intent::ContactoHumano),
            desinteres: intents.contains(&Intent::Desinteres),
            calification_block_reason: None,
            schedule_block_reason: None,
        };

        if filters.calification && !matches!(stage, Stage::Conversation | Stage::Qualified) {
            filters.calification = false;
            filters.calification_block_reason = Some(BlockReason::StageNotAllowed);
        }
        if filters.schedule && stage != Stage::Qualified {
            filters.schedule = false;
            filters.schedule_block_reason = Some(BlockReason::StageNotAllowed);
        }

        filters
    }

    pub fn any_active(&self) -> bool {
        self.rag
            || self.intention
            || self.calification
            || self.schedule
            || self.files
            || self.contact
            || self.desinteres
    }

    /// Flag pairs under their external names, for the pipeline output map.
    pub fn as_pairs(&self) -> [(&'static str, bool); 7] {
        [
            ("filter_rag", self.rag),
            ("filter_intention", self.intention),
            ("filter_calification", self.calification),
            ("filter_schedule", self.schedule),
            ("filter_files", self.files),
            ("filter_contact", self.contact),
            ("filter_desinteres", self.desinteres),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{BlockReason, FilterSet};
    use crate::domain::intent::Intent;
    use crate::domain::stage::Stage;

    fn intents(list: &[Intent]) -> BTreeSet<Intent> {
        list.iter().copied().collect()
    }

    #[test]
    fn resolution_is_total_over_all_stages() {
        for stage in Stage::ALL {
            for intent in Intent::ALL {
                let filters = FilterSet::resolve(&intents(&[intent]), stage);
                // All seven flags always exist; this is a struct, but the
                // external pairs must stay complete too.
                assert_eq!(filters.as_pairs().len(), 7);
            }
        }
    }

    #[test]
    fn information_intents_activate_rag() {
        let filters =
            FilterSet::resolve(&intents(&[Intent::BusquedaInformacion]), Stage::NewProspect);
        assert!(filters.rag);
        assert!(!filters.files);

        let filters =
            FilterSet::resolve(&intents(&[Intent::PideFotosPlanoVideos]), Stage::NewProspect);
        assert!(filters.rag);
        assert!(filters.files);
    }

    #[test]
    fn calification_is_gated_by_stage() {
        let blocked = FilterSet::resolve(&intents(&[Intent::FormaPago]), Stage::NewProspect);
        assert!(!blocked.calification);
        assert_eq!(blocked.calification_block_reason, Some(BlockReason::StageNotAllowed));

        let allowed = FilterSet::resolve(&intents(&[Intent::FormaPago]), Stage::Qualified);
        assert!(allowed.calification);
        assert_eq!(allowed.calification_block_reason, None);

        let conversation =
            FilterSet::resolve(&intents(&[Intent::FechaCompra]), Stage::Conversation);
        assert!(conversation.calification);
    }

    #[test]
    fn schedule_requires_qualified_stage() {
        for stage in [Stage::NewProspect, Stage::Conversation, Stage::NotQualified, Stage::Scheduled]
        {
            let filters = FilterSet::resolve(&intents(&[Intent::FechaVisita]), stage);
            assert!(!filters.schedule, "stage {stage} must block scheduling");
            assert_eq!(filters.schedule_block_reason, Some(BlockReason::StageNotAllowed));
        }

        let filters = FilterSet::resolve(&intents(&[Intent::FechaVisita]), Stage::Qualified);
        assert!(filters.schedule);
        assert_eq!(filters.schedule_block_reason, None);
    }

    #[test]
    fn block_reason_absent_when_intent_never_fired() {
        let filters = FilterSet::resolve(&intents(&[Intent::Desinteres]), Stage::NewProspect);
        assert_eq!(filters.calification_block_reason, None);
        assert_eq!(filters.schedule_block_reason, None);
        assert!(filters.desinteres);
    }

    #[test]
    fn empty_intents_activate_nothing() {
        let filters = FilterSet::resolve(&BTreeSet::new(), Stage::Conversation);
        assert!(!filters.any_active());
    }
}
