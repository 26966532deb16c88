use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Closed vocabulary of inbound-message intents. The wire labels are the
/// Spanish snake_case strings the classifier prompt and the persisted
/// metadata use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BusquedaInformacion,
    PideFotosPlanoVideos,
    AnotarProyecto,
    FormaPago,
    FechaCompra,
    FechaVisita,
    EnviarArchivos,
    ContactoHumano,
    Desinteres,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Intent::BusquedaInformacion,
        Intent::PideFotosPlanoVideos,
        Intent::AnotarProyecto,
        Intent::FormaPago,
        Intent::FechaCompra,
        Intent::FechaVisita,
        Intent::EnviarArchivos,
        Intent::ContactoHumano,
        Intent::Desinteres,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::BusquedaInformacion => "busqueda_informacion",
            Intent::PideFotosPlanoVideos => "pide_fotos_plano_videos",
            Intent::AnotarProyecto => "anotar_proyecto",
            Intent::FormaPago => "forma_pago",
            Intent::FechaCompra => "fecha_compra",
            Intent::FechaVisita => "fecha_visita",
            Intent::EnviarArchivos => "enviar_archivos",
            Intent::ContactoHumano => "contacto_humano",
            Intent::Desinteres => "desinteres",
        }
    }

    /// Keywords for the deterministic classifier. Matched as substrings of
    /// the normalized (lowercased, accent-stripped) message.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Intent::BusquedaInformacion => &["informacion", "detalle", "proyecto"],
            Intent::PideFotosPlanoVideos => &["foto", "imagenes", "plano"],
            Intent::AnotarProyecto => &["anotar", "registrar"],
            Intent::FormaPago => &["cuota", "pago", "credito"],
            Intent::FechaCompra => &["comprar", "cuando", "plazo"],
            Intent::FechaVisita => &["visita", "agendar", "tour"],
            Intent::EnviarArchivos => {
                &["enviar", "envia", "enviame", "archivo", "archivos", "foto", "fotos"]
            }
            Intent::ContactoHumano => {
                &["contacto", "asesor", "vendedor", "humano", "llamar", "telefono"]
            }
            Intent::Desinteres => &["no me interesa", "desinteres", "no quiero", "deten", "stop"],
        }
    }

    /// Keywords for the secondary augmentation pass that runs regardless of
    /// whether the model or the heuristic produced the primary set. Only the
    /// three must-never-miss intents participate.
    pub fn augmentation_keywords(&self) -> Option<&'static [&'static str]> {
        match self {
            Intent::EnviarArchivos => Some(&["enviar", "archivo", "foto"]),
            Intent::ContactoHumano => {
                Some(&["contacto", "asesor", "vendedor", "humano", "llamar", "telefono"])
            }
            Intent::Desinteres => {
                Some(&["no me interesa", "desinteres", "no quiero", "deten", "stop"])
            }
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "busqueda_informacion" => Ok(Intent::BusquedaInformacion),
            "pide_fotos_plano_videos" => Ok(Intent::PideFotosPlanoVideos),
            "anotar_proyecto" => Ok(Intent::AnotarProyecto),
            "forma_pago" => Ok(Intent::FormaPago),
            "fecha_compra" => Ok(Intent::FechaCompra),
            "fecha_visita" => Ok(Intent::FechaVisita),
            "enviar_archivos" => Ok(Intent::EnviarArchivos),
            "contacto_humano" => Ok(Intent::ContactoHumano),
            "desinteres" => Ok(Intent::Desinteres),
            other => Err(DomainError::UnknownIntentLabel(other.to_owned())),
        }
    }
}

/// Alias expansion: a request for photos/plans/videos always implies the
/// file-delivery capability. Expansion, never replacement.
pub fn expand_aliases(intents: &mut BTreeSet<Intent>) {
    if intents.contains(&Intent::PideFotosPlanoVideos) {
        intents.insert(Intent::EnviarArchivos);
    }
}
