//! Label vocabulary helpers: BIO tag parsing and the public entity type form.

/// The label a checkpoint uses for tokens outside any entity.
pub const OUTSIDE: &str = "O";

/// Position marker of a BIO-tagged label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BioPrefix {
    Begin,
    Inside,
}

/// Split a model label into its BIO prefix and bare tag.
///
/// Labels without a `B-`/`I-` prefix (including `O`) count as inside-tags of their
/// own name, so consecutive unprefixed tokens with the same label chain together.
pub fn split_tag(label: &str) -> (BioPrefix, &str) {
    if let Some(tag) = label.strip_prefix("B-") {
        (BioPrefix::Begin, tag)
    } else if let Some(tag) = label.strip_prefix("I-") {
        (BioPrefix::Inside, tag)
    } else {
        (BioPrefix::Inside, label)
    }
}

/// Whether a label (prefixed or not) marks a non-entity token.
pub fn is_outside(label: &str) -> bool {
    split_tag(label).1 == OUTSIDE
}

/// The entity type reported to clients: bare tag, uppercased.
///
/// `B-Sign_symptom` and `Sign_symptom` both become `SIGN_SYMPTOM`.
pub fn entity_type_label(label: &str) -> String {
    split_tag(label).1.to_uppercase()
}
