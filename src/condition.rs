use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a single-branch `CASE WHEN <expr> THEN ...` statement and captures `<expr>`.
static CASE_WHEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^CASE WHEN(.*?) THEN ").expect("CASE WHEN pattern is valid"));

/// Extracts the boolean expression from a templated conditional.
///
/// `CASE WHEN status = 'OPEN' THEN true ELSE false END` becomes `status = 'OPEN'`.
/// Anything that does not start with `CASE WHEN`, or has no ` THEN ` after it,
/// comes back trimmed but otherwise untouched. Nested CASE statements and
/// multiple WHEN clauses are not understood: only the text up to the first
/// ` THEN ` is taken.
pub fn extract_condition(input: &str) -> String {
    let trimmed = input.trim();

    match CASE_WHEN.captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(expr) => expr.as_str().trim().to_string(),
        None => trimmed.to_string(),
    }
}
