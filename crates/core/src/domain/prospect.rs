use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{BrokerId, ProspectId, RealtorId};
use crate::domain::stage::Stage;

/// Structured qualification fields extracted from conversation. Unknown
/// values are empty strings, never nulls, so records stay mergeable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationVariables {
    #[serde(default)]
    pub forma_pago: String,
    #[serde(default)]
    pub fecha_compra_estimativa: String,
    #[serde(default)]
    pub notas_adicionales: String,
}

impl QualificationVariables {
    pub fn is_empty(&self) -> bool {
        self.forma_pago.trim().is_empty()
            && self.fecha_compra_estimativa.trim().is_empty()
            && self.notas_adicionales.trim().is_empty()
    }

    /// Field-level merge: a non-empty incoming value wins, an empty one
    /// never clobbers stored data.
    pub fn merge_from(&mut self, incoming: &QualificationVariables) {
        merge_field(&mut self.forma_pago, &incoming.forma_pago);
        merge_field(&mut self.fecha_compra_estimativa, &incoming.fecha_compra_estimativa);
        merge_field(&mut self.notas_adicionales, &incoming.notas_adicionales);
    }

    pub fn trimmed(mut self) -> Self {
        self.forma_pago = self.forma_pago.trim().to_owned();
        self.fecha_compra_estimativa = self.fecha_compra_estimativa.trim().to_owned();
        self.notas_adicionales = self.notas_adicionales.trim().to_owned();
        self
    }
}

fn merge_field(target: &mut String, incoming: &str) {
    let incoming = incoming.trim();
    if !incoming.is_empty() {
        *target = incoming.to_owned();
    }
}

/// Durable prospect record, keyed by (realtor, phone). Mutated only through
/// the persistence layer, never directly by sub-agents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prospect {
    pub id: ProspectId,
    pub realtor_id: RealtorId,
    pub telephone: String,
    pub name: Option<String>,
    pub stage: Stage,
    pub vendor_id: Option<BrokerId>,
    pub qualification: QualificationVariables,
    pub scheduled_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}
