use crate::entity::{EntityMention, EntityType};

const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "dr", "prof", "professor", "sir", "herr", "frau", "fraulein",
    "fräulein", "monsieur", "m", "mme", "madame", "mlle", "signor", "signora", "senor", "señor",
];

const ARTICLES: &[&str] = &[
    "the", "der", "die", "das", "le", "la", "les", "l", "el", "il", "lo", "gli", "los", "las",
];

/// Canonical comparison form of an entity's text.
///
/// Lower-cases, turns punctuation into whitespace and collapses it, then
/// drops leading honorifics (PERSON) or articles (LOCATION, ORGANIZATION).
/// Letters keep their diacritics. TIME text keeps `-` and `/` so ISO dates
/// and year ranges survive. A strip never empties the text, which keeps the
/// function idempotent.
#[must_use]
pub fn normalize(entity_type: EntityType, text: &str) -> String {
    let keeps_separators = entity_type == EntityType::Time;

    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '–' | '—' if keeps_separators => '-',
            '-' | '/' if keeps_separators => c,
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let strip_words: &[&str] = match entity_type {
        EntityType::Person => HONORIFICS,
        EntityType::Location | EntityType::Organization => ARTICLES,
        _ => &[],
    };

    let leading = tokens
        .iter()
        .take_while(|t| strip_words.contains(*t))
        .count()
        .min(tokens.len().saturating_sub(1));
    tokens.drain(..leading);

    tokens.join(" ")
}

/// Re-derive a mention's `normalized_text`, falling back to its surface text
/// when no normalized form was recorded.
pub fn normalize_mention(mention: &mut EntityMention) {
    let basis = if mention.normalized_text.trim().is_empty() {
        &mention.surface_text
    } else {
        &mention.normalized_text
    };
    mention.normalized_text = normalize(mention.entity_type, basis);
}
