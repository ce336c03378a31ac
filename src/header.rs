//! Header normalization for uploaded CSV files.
//!
//! Inventories arrive with hand-written column titles ("Item ID", "Width (cm)",
//! "itemId", ...). `normalize_header` maps every title onto a canonical field
//! name. Titles without a known alias fall back to a slug of themselves, so no
//! column is ever dropped.

/// Unit annotation removed from dimension columns before the alias lookup.
const UNIT_ANNOTATION: &str = "(cm)";

/// Known header variants (lowercase) and their canonical field names.
const HEADER_ALIASES: &[(&str, &str)] = &[
    ("item id", "item_id"),
    ("itemid", "item_id"),
    ("item_id", "item_id"),
    ("item", "item_id"),
    ("name", "name"),
    ("item name", "name"),
    ("itemname", "name"),
    ("width", "width"),
    ("width (cm)", "width"),
    ("w", "width"),
    ("depth", "depth"),
    ("depth (cm)", "depth"),
    ("d", "depth"),
    ("height", "height"),
    ("height (cm)", "height"),
    ("h", "height"),
    ("mass", "mass"),
    ("mass (kg)", "mass"),
    ("weight", "mass"),
    ("weight (kg)", "mass"),
    ("priority", "priority"),
    ("priority (1-100)", "priority"),
    ("expiry date", "expiry_date"),
    ("expiry date (iso format)", "expiry_date"),
    ("expiry", "expiry_date"),
    ("expirydate", "expiry_date"),
    ("expiry_date", "expiry_date"),
    ("usage limit", "usage_limit"),
    ("usagelimit", "usage_limit"),
    ("usage_limit", "usage_limit"),
    ("usage count", "usage_count"),
    ("usagecount", "usage_count"),
    ("usage_count", "usage_count"),
    ("preferred zone", "preferred_zone"),
    ("preferredzone", "preferred_zone"),
    ("preferred_zone", "preferred_zone"),
    ("container id", "container_id"),
    ("containerid", "container_id"),
    ("container_id", "container_id"),
    ("container", "container_id"),
    ("zone", "zone"),
    ("user id", "user_id"),
    ("userid", "user_id"),
    ("user_id", "user_id"),
    ("timestamp", "timestamp"),
    ("time", "timestamp"),
];

fn lookup_alias(candidate: &str) -> Option<&'static str> {
    HEADER_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(candidate))
        .map(|(_, canonical)| *canonical)
}

/// Lowercase, underscore-joined form of a header.
fn slugify(cleaned: &str) -> String {
    cleaned.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Maps a raw header onto its canonical field name.
///
/// The header is trimmed, lowercased and stripped of the `(cm)` annotation.
/// Both the cleaned string and the trimmed original are looked up in the alias
/// table; without a match the cleaned string is slugified.
///
/// # Examples
/// ```ignore
/// assert_eq!(normalize_header("  Item ID "), "item_id");
/// assert_eq!(normalize_header("WIDTH (cm)"), "width");
/// assert_eq!(normalize_header("Start Width"), "start_width");
/// ```
pub fn normalize_header(raw_header: &str) -> String {
    let trimmed = raw_header.trim();
    let lowered = trimmed.to_lowercase();
    let cleaned = lowered.replace(UNIT_ANNOTATION, "");
    let cleaned = cleaned.trim();

    lookup_alias(cleaned)
        .or_else(|| lookup_alias(trimmed))
        .map(str::to_string)
        .unwrap_or_else(|| slugify(cleaned))
}
