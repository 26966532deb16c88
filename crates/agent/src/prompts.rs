use tera::Tera;

use prospera_core::errors::ApplicationError;

const CLASSIFIER: &str = "\
Eres el asistente virtual de una inmobiliaria. Clasifica la intención del \
mensaje del prospecto y responde SOLO con un objeto JSON con esta forma:\n\
{\"intents\": [\"...\"], \"reply\": \"...\", \"handoff\": false}\n\n\
Las intenciones válidas son: busqueda_informacion, pide_fotos_plano_videos, \
anotar_proyecto, forma_pago, fecha_compra, fecha_visita, enviar_archivos, \
contacto_humano, desinteres. Incluye todas las que apliquen. Usa `handoff` \
solo cuando el caso requiera a una persona del equipo de ventas.";

const RETRIEVAL: &str = "\
Eres un asesor inmobiliario que responde consultas sobre proyectos.\n\n\
Consulta del usuario: {{ question }}\n\n\
Contexto:\n{{ context_block }}\n\n\
Reglas estrictas:\n\
1. Responde únicamente con la información del contexto.\n\
2. Si no encuentras datos suficientes en el contexto, indica que no hay \
información disponible.\n\
3. Menciona siempre el nombre del proyecto y detalles concretos (precios, \
ubicación, tipología, estado) si están presentes.\n\
4. Mantén un tono profesional y conciso.\n\
5. No inventes ni hagas suposiciones fuera del contexto.";

const QUALIFICATION: &str = "\
Extrae los datos de calificación financiera del prospecto a partir del \
mensaje y responde SOLO con un objeto JSON:\n\
{\"reply\": \"...\", \"calification\": {\"forma_pago\": \"\", \
\"fecha_compra_estimativa\": \"\", \"notas_adicionales\": \"\"}, \"stage\": null}\n\n\
`forma_pago` toma valores como contado, credito_consumo, credito_hipotecario \
u otro. `fecha_compra_estimativa` va en formato YYYY-MM-DD. Usa cadenas \
vacías cuando un dato no aparezca; nunca null dentro de `calification`.";

const SCHEDULE: &str = "\
Ayudas a registrar visitas a proyectos inmobiliarios. Fecha actual: \
{{ current_date }}. Debes devolver fechas en formato YYYY-MM-DD.\n\n\
Responde SOLO con un objeto JSON:\n\
{\"reply\": \"...\", \"visit\": {\"date\": \"\", \"notes\": \"\"}, \"stage\": null}\n\n\
Si el mensaje no fija un día concreto deja `date` vacío y pregunta por la \
fecha en `reply`.";

const FILES: &str = "\
Identifica qué archivos pide el prospecto y para qué proyectos. Responde \
SOLO con un objeto JSON:\n\
{\"reply\": \"...\", \"types\": [], \"projects\": []}\n\n\
Los tipos válidos son image, video, kmz y document. Deja las listas vacías \
cuando el mensaje no lo especifique.";

const COMPOSER: &str = "\
Eres {{ bot_name }}, asistente de {{ realtor_name }}. Personalidad: \
{{ bot_personality }}. Tono: {{ bot_tone }}.\n\n\
{{ stage_instruction }}\n\n\
Información disponible de esta conversación:\n{{ additional_info }}\n\n\
Redacta una única respuesta breve para WhatsApp, cercana y sin listas \
numeradas. No repitas saludos si la conversación ya está en curso y no \
inventes datos que no estén en la información disponible.";

const TONE: &str = "\
Reescribe la respuesta del asistente para que suene humana, breve y con el \
tono de la marca, sin cambiar los hechos ni agregar información nueva.\n\n\
Mensaje del usuario: {{ user_message }}\n\n\
Respuesta a reescribir:\n{{ base_reply }}";

const SPLITTER: &str = "\
Divide la respuesta en mensajes consecutivos de WhatsApp de máximo \
{{ max_chars }} caracteres, cortando en límites de oración. Responde SOLO \
con un objeto JSON: {\"messages\": [\"...\"]}.\n\n\
Mensaje del usuario: {{ user_message }}\n\n\
Respuesta a dividir:\n{{ reply }}";

const ESCALATION: &str = "\
Decide si este intercambio necesita una nota de justificación para revisión \
humana (quejas, reclamos, promesas fuera de lo normal, datos sensibles). \
Responde SOLO con un objeto JSON:\n\
{\"requires_justification\": false, \"justification\": \"\"}\n\n\
Mensaje del usuario: {{ user_message }}\n\n\
Respuesta enviada:\n{{ reply }}";

/// Embedded prompt templates, rendered with `tera`. A rendering failure is
/// treated like a model failure: the caller takes its deterministic path.
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, ApplicationError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("classifier", CLASSIFIER),
            ("retrieval", RETRIEVAL),
            ("qualification", QUALIFICATION),
            ("schedule", SCHEDULE),
            ("files", FILES),
            ("composer", COMPOSER),
            ("tone", TONE),
            ("splitter", SPLITTER),
            ("escalation", ESCALATION),
        ])
        .map_err(|error| {
            ApplicationError::Configuration(format!("prompt templates failed to load: {error}"))
        })?;
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &tera::Context) -> Option<String> {
        match self.tera.render(name, context) {
            Ok(rendered) => Some(rendered),
            Err(error) => {
                tracing::warn!(template = name, error = %error, "prompt rendering failed");
                None
            }
        }
    }
}
