use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Ordered (field, pattern) rules. Each pattern is label-then-value with
/// the value in capture group 1, confined to the label's line.
static FIELD_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "patient_name",
            r"(?i)\b(?:patient name|name)[ \t:]*([a-z \t]+)",
        ),
        (
            "date_of_birth",
            r"(?i)\b(?:date of birth|birth date|dob)[ \t:]*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})",
        ),
        (
            "incident_date",
            r"(?i)\b(?:date of incident|incident date|date)[ \t:]*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})",
        ),
        ("age", r"(?i)\bage[ \t:]*(\d{1,3})\b"),
        ("gender", r"(?i)\b(?:gender|sex)[ \t:]*(female|male|f|m)\b"),
        (
            "staff_id",
            r"(?i)\b(?:staff id|staff no|employee id)[ \t:]*(\d+)",
        ),
        ("location", r"(?i)\b(?:location|where)[ \t:]*([a-z \t]+)"),
        (
            "symptoms",
            r"(?i)\b(?:symptoms|signs|complaint)[ \t:]*([a-z \t,.\-]+)",
        ),
        (
            "injury_type",
            r"(?i)\b(?:type of injury|injury)[ \t:]*([a-z \t,.\-]+)",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

/// Apply every field rule to `text`, keeping the first non-empty match per
/// rule in document order. Unmatched rules are absent from the mapping.
pub fn parse_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for (name, pattern) in FIELD_RULES.iter() {
        let value = pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .find(|v| !v.is_empty());

        if let Some(value) = value {
            fields.insert((*name).to_string(), value.to_string());
        }
    }

    fields
}

/// Field names in rule order.
pub fn field_names() -> impl Iterator<Item = &'static str> {
    FIELD_RULES.iter().map(|(name, _)| *name)
}
