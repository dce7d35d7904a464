//! Secret redaction applied to any string bound for a log line.
//!
//! Scanning is regex-based and intentionally conservative: it is better to
//! over-redact a false positive than to leak a bearer token. If the
//! scanner itself fails to build (it never should, the patterns are
//! static), callers get a fail-closed placeholder rather than the raw
//! text.

use std::sync::OnceLock;

use regex::Regex;

struct Scanner {
    patterns: Vec<Regex>,
}

fn scanner() -> &'static Result<Scanner, String> {
    static SCANNER: OnceLock<Result<Scanner, String>> = OnceLock::new();
    SCANNER.get_or_init(build_scanner)
}

fn build_scanner() -> Result<Scanner, String> {
    let raw_patterns = [
        r"(?i)\bBearer\s+[A-Za-z0-9._\-]+",
        r"(?i)\bBasic\s+[A-Za-z0-9+/=]+",
        r#"(?i)"(?:token|apiKey|api_key|password|secret)"\s*:\s*"[^"]*""#,
        r"(?i)\b(?:token|api_key|apikey)=([^&\s]+)",
        r"(?i)\b(?:AWS_SECRET_ACCESS_KEY|OPENAI_API_KEY|GITHUB_TOKEN|ANTHROPIC_API_KEY)=\S+",
    ];
    let mut patterns = Vec::with_capacity(raw_patterns.len());
    for pat in raw_patterns {
        patterns.push(Regex::new(pat).map_err(|e| e.to_string())?);
    }
    Ok(Scanner { patterns })
}

/// Replace anything resembling a credential in `input` with `[REDACTED]`.
///
/// On scanner initialization failure (should never happen in practice)
/// returns a fixed, unguessable placeholder rather than the original text.
pub fn redact(input: &str) -> String {
    match scanner() {
        Ok(scanner) => {
            let mut out = input.to_string();
            for re in &scanner.patterns {
                out = re.replace_all(&out, "[REDACTED]").into_owned();
            }
            out
        }
        Err(_) => "[REDACTED-ERROR id=scanner-init]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_bearer_token() {
        let s = redact("Authorization: Bearer sk-abc123.def");
        assert!(!s.contains("sk-abc123"));
        assert!(s.contains("[REDACTED]"));
    }

    #[test]
    fn redacts_json_password_field() {
        let s = redact(r#"{"password":"hunter2","user":"bob"}"#);
        assert!(!s.contains("hunter2"));
        assert!(s.contains("bob"));
    }

    #[test]
    fn redacts_query_param_token() {
        let s = redact("GET /callback?api_key=xyz789&foo=bar");
        assert!(!s.contains("xyz789"));
        assert!(s.contains("foo=bar"));
    }

    #[test]
    fn redacts_known_env_secret() {
        let s = redact("spawned child with OPENAI_API_KEY=sk-live-12345 in env");
        assert!(!s.contains("sk-live-12345"));
    }

    #[test]
    fn leaves_ordinary_text_untouched() {
        let s = redact("server srv1 transitioned to ready");
        assert_eq!(s, "server srv1 transitioned to ready");
    }
}
