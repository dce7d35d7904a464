//! `${VAR}` / `${VAR:-default}` expansion, applied to config string values
//! before the core ever sees them.

use std::sync::OnceLock;

use regex::Regex;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}").expect("static pattern is valid")
    })
}

/// Expand `${VAR}` and `${VAR:-default}` references in `input` against the
/// process environment. An unset variable with no default expands to the
/// empty string.
pub fn expand(input: &str) -> String {
    pattern()
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(value) => value,
                Err(_) => caps.get(3).map(|m| m.as_str()).unwrap_or_default().to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_set_variable() {
        // SAFETY: test runs single-threaded within this process w.r.t. this var.
        unsafe { std::env::set_var("HATAGO_TEST_VAR", "value") };
        assert_eq!(expand("prefix-${HATAGO_TEST_VAR}-suffix"), "prefix-value-suffix");
        unsafe { std::env::remove_var("HATAGO_TEST_VAR") };
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        unsafe { std::env::remove_var("HATAGO_TEST_MISSING") };
        assert_eq!(expand("${HATAGO_TEST_MISSING:-fallback}"), "fallback");
    }

    #[test]
    fn unset_without_default_expands_empty() {
        unsafe { std::env::remove_var("HATAGO_TEST_MISSING_2") };
        assert_eq!(expand("x${HATAGO_TEST_MISSING_2}y"), "xy");
    }

    #[test]
    fn leaves_text_without_references_untouched() {
        assert_eq!(expand("plain string"), "plain string");
    }

    #[test]
    fn expands_multiple_references() {
        unsafe { std::env::set_var("HATAGO_TEST_A", "1") };
        unsafe { std::env::set_var("HATAGO_TEST_B", "2") };
        assert_eq!(expand("${HATAGO_TEST_A}-${HATAGO_TEST_B}"), "1-2");
        unsafe { std::env::remove_var("HATAGO_TEST_A") };
        unsafe { std::env::remove_var("HATAGO_TEST_B") };
    }
}
