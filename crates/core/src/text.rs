//! Text helpers shared by the classifier, retrieval fallbacks, catalog
//! matching, and the message splitter.

/// Fold the Spanish accented characters the intent keywords care about.
pub fn strip_accents(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

/// Lowercased, accent-stripped form used for keyword and catalog matching.
pub fn normalize(text: &str) -> String {
    strip_accents(text).to_lowercase()
}

const BREAK_PATTERNS: [&str; 5] = ["\n\n", "\n", ". ", "; ", ", "];

/// Split `text` into fragments of at most `limit` characters, preferring
/// paragraph, sentence and clause boundaries. A boundary in the first 40% of
/// the window is ignored in favor of a hard cut, so fragments never collapse
/// to slivers.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let stripped = text.trim();
    if stripped.is_empty() || limit == 0 {
        return Vec::new();
    }
    if stripped.chars().count() <= limit {
        return vec![stripped.to_owned()];
    }

    let mut chunks = Vec::new();
    let mut remaining = stripped;
    while !remaining.is_empty() {
        if remaining.chars().count() <= limit {
            chunks.push(remaining.trim().to_owned());
            break;
        }

        let window_end = byte_index_of_char(remaining, limit);
        let window = &remaining[..window_end];
        let break_byte = BREAK_PATTERNS.iter().filter_map(|pattern| window.rfind(pattern)).max();

        let cut_byte = match break_byte {
            // `+ 1` keeps the boundary character with the leading fragment;
            // every break pattern starts with a single-byte character.
            Some(index) if window[..index].chars().count() * 5 >= limit * 2 => index + 1,
            _ => window_end,
        };

        let fragment = remaining[..cut_byte].trim();
        if !fragment.is_empty() {
            chunks.push(fragment.to_owned());
        }
        remaining = remaining[cut_byte..].trim_start();
    }
    chunks
}

/// Re-chunk already-split messages so no fragment can exceed the limit, even
/// when the segments were proposed by a model.
pub fn enforce_limit(messages: &[String], limit: usize) -> Vec<String> {
    messages.iter().flat_map(|message| chunk_message(message, limit)).collect()
}

/// Edit distance over characters, for catalog-name fuzzy matching.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

fn byte_index_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(index, _)| index).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::{chunk_message, enforce_limit, levenshtein, normalize, strip_accents};

    fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn accents_fold_for_matching() {
        assert_eq!(strip_accents("agendar visita mañana"), "agendar visita manana");
        assert_eq!(normalize("¿Qué PROYECTOS tienen?"), "¿que proyectos tienen?");
    }

    #[test]
    fn short_text_is_a_single_fragment() {
        assert_eq!(chunk_message("Hola, ¿cómo estás?", 400), vec!["Hola, ¿cómo estás?"]);
        assert!(chunk_message("   ", 400).is_empty());
    }

    #[test]
    fn fragments_never_exceed_the_limit() {
        let text = "Tenemos tres proyectos disponibles. El primero queda en la zona norte, \
                    cerca del metro; el segundo es un condominio con áreas verdes, piscina y \
                    quincho. El tercero está en etapa de lanzamiento, con precios preferentes \
                    para compradores que reserven este mes. Todos cuentan con opciones de \
                    financiamiento y visitas guiadas los días sábado."
            .repeat(3);
        let chunks = chunk_message(&text, 120);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120, "fragment too long: {chunk}");
        }
    }

    #[test]
    fn concatenation_is_lossless_modulo_whitespace() {
        let text = "Primera idea completa. Segunda idea con más detalle; incluye una pausa, \
                    y una enumeración final.\n\nNuevo párrafo con el cierre del mensaje.";
        let chunks = chunk_message(text, 60);
        assert_eq!(collapse_whitespace(&chunks.join(" ")), collapse_whitespace(text));
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let text = "Una frase corta. Otra frase que completa la respuesta del asistente.";
        let chunks = chunk_message(text, 30);
        assert_eq!(chunks[0], "Una frase corta.");
    }

    #[test]
    fn early_boundary_is_ignored_in_favor_of_hard_cut() {
        // Only boundary sits in the first 40% of the window, so the cut is hard.
        let text = format!("Si. {}", "x".repeat(200));
        let chunks = chunk_message(&text, 100);
        assert!(chunks[0].chars().count() == 100);
    }

    #[test]
    fn unbroken_text_hard_cuts() {
        let text = "a".repeat(950);
        let chunks = chunk_message(&text, 400);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 400);
        assert_eq!(chunks[2].chars().count(), 150);
    }

    #[test]
    fn enforce_limit_rechunks_model_output() {
        let proposed = vec!["corto".to_owned(), "b".repeat(500)];
        let enforced = enforce_limit(&proposed, 400);
        assert_eq!(enforced.len(), 3);
        assert!(enforced.iter().all(|m| m.chars().count() <= 400));
    }

    #[test]
    fn levenshtein_measures_edits() {
        assert_eq!(levenshtein("mirador", "mirador"), 0);
        assert_eq!(levenshtein("mirador", "miradores"), 2);
        assert_eq!(levenshtein("altos", "los altos"), 4);
        assert_eq!(levenshtein("", "abc"), 3);
    }
}
