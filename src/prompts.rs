//! Prompt templates for field extraction.
//!
//! Every instruction sent to the model is built here so the templates can be
//! inspected by unit tests without a provider.

use crate::config::{FieldList, PromptVariant, ScorePair};

/// Delimiter placed on its own line before and after the source text.
pub const TEXT_DELIMITER: &str = "========";

/// Energy-efficiency rating bands: letter, lowest score, highest score.
pub const RATING_BANDS: [(char, u8, u8); 7] = [
    ('A', 92, 100),
    ('B', 81, 91),
    ('C', 69, 80),
    ('D', 55, 68),
    ('E', 39, 54),
    ('F', 21, 38),
    ('G', 1, 20),
];

/// Appended to the prompt when re-asking after an unparseable reply.
pub const STRICT_JSON_SUFFIX: &str = r#"

IMPORTANT: Your previous answer could not be parsed as JSON.
Respond with a single JSON object and nothing else: no prose, no
explanations, no markdown code fences. Use null for any value that is not
present in the source text."#;

/// Render the requested fields as the expected JSON keys, one per line.
pub fn field_lines(fields: &FieldList) -> String {
    fields
        .iter()
        .map(|f| format!("- \"{f}\" <string>"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the rating-band lookup table used by the enhanced variant.
pub fn rating_table() -> String {
    RATING_BANDS
        .iter()
        .map(|(letter, lo, hi)| format!("{letter}: {lo}-{hi}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the extraction instruction for one document.
///
/// `text` is embedded verbatim; truncation, if any, happens before this call.
pub fn build_prompt(
    fields: &FieldList,
    text: &str,
    variant: PromptVariant,
    pair: &ScorePair,
) -> String {
    let mut prompt = String::with_capacity(text.len() + 1024);
    prompt.push_str(
        "You are a text processing agent working with lease agreement documents \
and energy performance certificates.\n\n",
    );
    prompt.push_str("Extract only specified values from the source text.\n");
    prompt.push_str("Return answer as JSON object with the following fields:\n");
    prompt.push_str(&field_lines(fields));
    prompt.push('\n');

    if variant == PromptVariant::Enhanced {
        prompt.push_str(&enhanced_rules(pair));
    }

    prompt.push_str("\nUse only the source text provided below.\n");
    prompt.push_str(TEXT_DELIMITER);
    prompt.push('\n');
    prompt.push_str(text);
    prompt.push('\n');
    prompt.push_str(TEXT_DELIMITER);
    prompt.push('\n');
    prompt
}

/// Build the re-prompt sent after an unparseable reply.
pub fn build_strict_prompt(original: &str) -> String {
    format!("{original}{STRICT_JSON_SUFFIX}")
}

fn enhanced_rules(pair: &ScorePair) -> String {
    format!(
        "\nEnergy ratings map to score ranges as follows:\n{table}\n\n\
Normalise the values as follows:\n\
- \"{cr}\" and \"{pr}\" must each be a single capital letter from A to G.\n\
- \"{cs}\" and \"{ps}\" must each be an integer between 1 and 100.\n\
- If only a score is given, derive the letter from the table above; \
if only a letter is given, leave the score null.\n\
- \"{cs}\" is the current score and \"{ps}\" is the potential score; \
the potential score is normally the larger of the two.\n",
        table = rating_table(),
        cr = pair.current_rating,
        pr = pair.potential_rating,
        cs = pair.current_score,
        ps = pair.potential_score,
    )
}
