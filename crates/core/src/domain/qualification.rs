use chrono::NaiveDate;

use crate::domain::prospect::QualificationVariables;
use crate::domain::stage::Stage;

/// Stage transition derived from extracted qualification data, applied only
/// when the model did not supply a stage itself.
///
/// - `forma_pago == "otro"` disqualifies outright.
/// - Without a parseable purchase date the stage stays unresolved.
/// - A purchase date within 30 days qualifies; beyond that disqualifies.
pub fn auto_stage(variables: &QualificationVariables, today: NaiveDate) -> Option<Stage> {
    let forma = variables.forma_pago.trim().to_lowercase();
    if forma.is_empty() {
        return None;
    }
    if forma == "otro" {
        return Some(Stage::NotQualified);
    }

    let fecha = variables.fecha_compra_estimativa.trim();
    if fecha.is_empty() {
        return None;
    }
    let purchase_date = NaiveDate::parse_from_str(fecha, "%Y-%m-%d").ok()?;

    let delta_days = (purchase_date - today).num_days();
    if delta_days <= 30 {
        Some(Stage::Qualified)
    } else {
        Some(Stage::NotQualified)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::auto_stage;
    use crate::domain::prospect::QualificationVariables;
    use crate::domain::stage::Stage;

    fn vars(forma: &str, fecha: &str) -> QualificationVariables {
        QualificationVariables {
            forma_pago: forma.to_owned(),
            fecha_compra_estimativa: fecha.to_owned(),
            notas_adicionales: String::new(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn otro_disqualifies_regardless_of_date() {
        assert_eq!(auto_stage(&vars("otro", "2024-06-12"), today()), Some(Stage::NotQualified));
        assert_eq!(auto_stage(&vars("Otro", ""), today()), Some(Stage::NotQualified));
    }

    #[test]
    fn missing_or_malformed_date_leaves_stage_unresolved() {
        assert_eq!(auto_stage(&vars("contado", ""), today()), None);
        assert_eq!(auto_stage(&vars("contado", "pronto"), today()), None);
        assert_eq!(auto_stage(&vars("", "2024-06-12"), today()), None);
    }

    #[test]
    fn purchase_within_thirty_days_qualifies() {
        assert_eq!(auto_stage(&vars("contado", "2024-07-10"), today()), Some(Stage::Qualified));
        assert_eq!(auto_stage(&vars("contado", "2024-06-10"), today()), Some(Stage::Qualified));
    }

    #[test]
    fn purchase_beyond_thirty_days_disqualifies() {
        assert_eq!(
            auto_stage(&vars("credito_consumo", "2024-07-11"), today()),
            Some(Stage::NotQualified)
        );
    }
}
