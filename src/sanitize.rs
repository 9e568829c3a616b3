//! Redaction of credential-shaped text before a diff leaves the machine.

use regex::{Captures, Regex};
use std::sync::OnceLock;

pub const REDACTED: &str = "[FILTERED]";
pub const TRUNCATION_MARKER: &str = "\n\n... (diff truncated for AI processing)";
pub const DEFAULT_MAX_LENGTH: usize = 8000;

struct Rules {
    bearer: Regex,
    github_token: Regex,
    gitlab_token: Regex,
    openai_key: Regex,
    key_value: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        bearer: Regex::new(r#"(?i)\bbearer\s+[^\s'"]+"#).expect("valid bearer pattern"),
        github_token: Regex::new(r"\b(gh[pousr])_[A-Za-z0-9_]+").expect("valid github pattern"),
        gitlab_token: Regex::new(r"\bglpat-[A-Za-z0-9_\-]+").expect("valid gitlab pattern"),
        openai_key: Regex::new(r"\bsk-[A-Za-z0-9_\-]{16,}").expect("valid key pattern"),
        key_value: Regex::new(
            r#"(?i)\b([A-Za-z0-9_\-]*(?:token|key|secret|password|passwd|auth|credential)[A-Za-z0-9_\-]*)(['"]?)(\s*[=:]\s*|\s+)(['"]?)([^\s'"]+)"#,
        )
        .expect("valid key/value pattern"),
    })
}

/// Redact secrets in `diff` and cap the result at `max_length` characters.
///
/// Rules run in order: bearer headers, provider token prefixes, then generic
/// `<word containing token/key/secret/...> = value` assignments, with the key
/// optionally quoted as in JSON or YAML. A value that
/// is an auth scheme (`Bearer`, `Basic`) or already redacted is left alone so
/// earlier rules keep their readable form.
pub fn sanitize(diff: &str, max_length: usize) -> String {
    if diff.is_empty() {
        return String::new();
    }

    let r = rules();
    let text = r.bearer.replace_all(diff, format!("Bearer {REDACTED}").as_str());
    let text = r
        .github_token
        .replace_all(&text, |caps: &Captures| format!("{}_{REDACTED}", &caps[1]));
    let text = r
        .gitlab_token
        .replace_all(&text, format!("glpat-{REDACTED}").as_str());
    let text = r.openai_key.replace_all(&text, format!("sk-{REDACTED}").as_str());
    let text = r.key_value.replace_all(&text, |caps: &Captures| {
        let value = &caps[5];
        if value.starts_with(REDACTED)
            || value.ends_with(REDACTED)
            || value.eq_ignore_ascii_case("bearer")
            || value.eq_ignore_ascii_case("basic")
        {
            caps[0].to_string()
        } else {
            format!("{}{}{}{}{REDACTED}", &caps[1], &caps[2], &caps[3], &caps[4])
        }
    });

    truncate_chars(&text, max_length)
}

fn truncate_chars(text: &str, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
