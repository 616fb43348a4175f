use std::str::FromStr;

/// Reads `name` and returns it trimmed, treating blank values as unset.
pub fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Raw value plus its parse result, so callers can report what was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVar<T> {
    pub raw: String,
    pub value: Option<T>,
}

pub fn parse_var<T: FromStr>(name: &str) -> Option<ParsedVar<T>> {
    non_empty_var(name).map(|raw| {
        let value = raw.parse().ok();
        ParsedVar { raw, value }
    })
}
