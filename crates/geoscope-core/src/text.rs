//! Text helpers for upstream bodies that end up in errors and tool results.

/// Maximum length of upstream error bodies surfaced to callers and the model.
pub const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Cut to at most `max_chars` characters on a char boundary.
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}

/// Truncate an upstream body and redact it when it looks like it echoes
/// credentials.
pub fn sanitize_upstream_text(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated = truncate_str(&collapsed, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(response details redacted - may contain sensitive data)".to_string();
    }

    truncated.to_string()
}
