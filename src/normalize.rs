//! Column label → storage identifier normalization.
//!
//! Source workbooks carry Cyrillic, spaced and punctuated headers; target tables use plain
//! lowercase identifiers. [`normalize_column_name`] bridges the two.

use std::collections::HashMap;

/// Upper-case transliteration table. Lower-case letters map to the lower-cased replacement.
///
/// `Б` and `П` map to `V` and `R`: existing target tables were created with those column names.
const TRANSLIT_UPPER: &[(char, &str)] = &[
    ('А', "A"),
    ('Б', "V"),
    ('В', "V"),
    ('Г', "G"),
    ('Д', "D"),
    ('Е', "E"),
    ('Ё', "E"),
    ('Ж', "ZH"),
    ('З', "Z"),
    ('И', "I"),
    ('Й', "I"),
    ('К', "K"),
    ('Л', "L"),
    ('М', "M"),
    ('Н', "N"),
    ('О', "O"),
    ('П', "R"),
    ('Р', "R"),
    ('С', "S"),
    ('Т', "T"),
    ('У', "U"),
    ('Ф', "F"),
    ('Х', "KH"),
    ('Ц', "TC"),
    ('Ч', "CH"),
    ('Ш', "SH"),
    ('Щ', "SHCH"),
    ('Ы', "Y"),
    ('Э', "E"),
    ('Ю', "IU"),
    ('Я', "IA"),
];

fn transliterate_char(ch: char, out: &mut String) {
    for &(upper, latin) in TRANSLIT_UPPER {
        if ch == upper {
            out.push_str(latin);
            return;
        }
        if upper.to_lowercase().eq(ch.to_lowercase()) && ch.is_lowercase() {
            out.push_str(&latin.to_ascii_lowercase());
            return;
        }
    }
    out.push(ch);
}

/// Transliterate every character covered by the table; others pass through unchanged.
pub fn transliterate(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for ch in label.chars() {
        transliterate_char(ch, &mut out);
    }
    out
}

/// Map a raw column label to a storage-safe identifier.
///
/// Transliterates, trims, turns spaces into `_`, drops anything that is not alphanumeric or `_`
/// and lowercases the result. Distinct labels may collide; see [`normalize_columns`].
pub fn normalize_column_name(label: &str) -> String {
    let translit = transliterate(label);
    translit
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

/// Two source labels that normalize to the same identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnCollision {
    pub first: String,
    pub second: String,
    pub normalized: String,
}

/// Normalize a full header, rejecting collisions.
pub fn normalize_columns<'a, I>(labels: I) -> Result<Vec<String>, ColumnCollision>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashMap<String, &'a str> = HashMap::new();
    let mut out = Vec::new();
    for label in labels {
        let normalized = normalize_column_name(label);
        if let Some(first) = seen.insert(normalized.clone(), label) {
            return Err(ColumnCollision {
                first: first.to_string(),
                second: label.to_string(),
                normalized,
            });
        }
        out.push(normalized);
    }
    Ok(out)
}
