//! Semantic classifier (spec §4.2): attaches exactly one [`FieldType`] label
//! to each token, in the fixed priority order of
//! `FieldType::CLASSIFIER_PRIORITY`, falling back to `LITERAL` below a
//! confidence floor of 0.5.

use crate::field_type::FieldType;
use crate::token::{Token, TokenKind};

/// Bounded, case-insensitive severity vocabulary (spec §4.2).
pub const SEVERITY_VOCAB: &[&str] = &[
    "TRACE", "DEBUG", "INFO", "NOTICE", "WARN", "WARNING", "ERROR", "FATAL", "CRITICAL",
];

const CONFIDENCE_FLOOR: f32 = 0.5;

/// Classify one token, returning its label and the confidence that
/// produced it. `LITERAL`/`WHITESPACE` tokens (delimiters, whitespace
/// runs) are fixed by the tokenizer and always return confidence 1.0.
#[must_use]
pub fn classify(token: &Token<'_>) -> (FieldType, f32) {
    match token.kind {
        TokenKind::Delimiter(_) => (FieldType::Literal, 1.0),
        TokenKind::Whitespace => (FieldType::Whitespace, 1.0),
        TokenKind::Quoted => (FieldType::QuotedString, 1.0),
        TokenKind::Word | TokenKind::Number => classify_run(token.text),
    }
}

fn classify_run(text: &[u8]) -> (FieldType, f32) {
    for field_type in FieldType::CLASSIFIER_PRIORITY {
        let confidence = match field_type {
            FieldType::Uuid => confidence_uuid(text),
            FieldType::Ipv4 => confidence_ipv4(text),
            FieldType::Ipv6 => confidence_ipv6(text),
            FieldType::Timestamp => confidence_timestamp(text),
            FieldType::Integer => confidence_integer(text),
            FieldType::Host => confidence_host(text),
            FieldType::Path => confidence_path(text),
            FieldType::Url => confidence_url(text),
            FieldType::QuotedString => 0.0, // handled at the token-kind level
            FieldType::Severity => confidence_severity(text),
            FieldType::ProcessId => 0.0, // refined post-hoc by the template extractor
            _ => 0.0,
        };
        if confidence >= CONFIDENCE_FLOOR {
            return (field_type, confidence);
        }
    }
    (FieldType::Literal, 1.0)
}

fn is_hex_digit(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

fn confidence_uuid(text: &[u8]) -> f32 {
    let groups: Vec<&[u8]> = text.split(|&b| b == b'-').collect();
    let expected = [8, 4, 4, 4, 12];
    if groups.len() != 5 {
        return 0.0;
    }
    let matches = groups
        .iter()
        .zip(expected)
        .all(|(g, len)| g.len() == len && g.iter().all(|&b| is_hex_digit(b)));
    if matches {
        0.99
    } else {
        0.0
    }
}

fn confidence_ipv4(text: &[u8]) -> f32 {
    let octets: Vec<&[u8]> = text.split(|&b| b == b'.').collect();
    if octets.len() != 4 {
        return 0.0;
    }
    let valid = octets.iter().all(|o| {
        !o.is_empty()
            && o.len() <= 3
            && o.iter().all(|&b| b.is_ascii_digit())
            && std::str::from_utf8(o)
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .is_some_and(|v| v <= 255)
    });
    if valid {
        0.95
    } else {
        0.0
    }
}

fn confidence_ipv6(text: &[u8]) -> f32 {
    // Colons are tokenizer delimiters, so a bare run only reaches here
    // when the whole address was pre-folded by a composite pass (template
    // extractor). Still useful for inputs where `:` isn't a delimiter, or
    // bracketed literal forms like `::1`.
    if !text.contains(&b':') {
        return 0.0;
    }
    let inner = text;
    let groups: Vec<&[u8]> = inner.split(|&b| b == b':').collect();
    if groups.len() < 3 || groups.len() > 8 {
        return 0.0;
    }
    let ok = groups
        .iter()
        .all(|g| g.is_empty() || (g.len() <= 4 && g.iter().all(|&b| is_hex_digit(b))));
    if ok {
        0.9
    } else {
        0.0
    }
}

/// Single-token timestamp shapes (RFC3339/ISO8601, no internal delimiter
/// splitting needed since `-`, `:`, `.`, `T`, `Z` are not tokenizer
/// delimiters except `:`... but RFC3339 contains `:`, which *is* a
/// delimiter, so in practice this only fires for epoch-like all-digit
/// forms or date-only `YYYY-MM-DD`. Multi-token clock times are folded by
/// `template::fold_composites` before classification sees them.
fn confidence_timestamp(text: &[u8]) -> f32 {
    let s = match std::str::from_utf8(text) {
        Ok(s) => s,
        Err(_) => return 0.0,
    };
    let is_iso_date = s.len() == 10
        && s.as_bytes()[4] == b'-'
        && s.as_bytes()[7] == b'-'
        && s[0..4].bytes().all(|b| b.is_ascii_digit())
        && s[5..7].bytes().all(|b| b.is_ascii_digit())
        && s[8..10].bytes().all(|b| b.is_ascii_digit());
    if is_iso_date {
        return 0.8;
    }
    // 10 or 13 digit epoch (seconds or milliseconds).
    if (s.len() == 10 || s.len() == 13) && s.bytes().all(|b| b.is_ascii_digit()) {
        return 0.55;
    }
    0.0
}

fn confidence_integer(text: &[u8]) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    let body = text.strip_prefix(b"-").unwrap_or(text);
    if !body.is_empty() && body.iter().all(|&b| b.is_ascii_digit()) {
        0.9
    } else {
        0.0
    }
}

fn confidence_host(text: &[u8]) -> f32 {
    let s = match std::str::from_utf8(text) {
        Ok(s) => s,
        Err(_) => return 0.0,
    };
    let labels: Vec<&str> = s.split('.').collect();
    if labels.len() < 2 {
        return 0.0;
    }
    let looks_like_host = labels.iter().all(|label| {
        !label.is_empty()
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    }) && s.bytes().any(|b| b.is_ascii_alphabetic());
    if looks_like_host {
        0.6
    } else {
        0.0
    }
}

fn confidence_path(text: &[u8]) -> f32 {
    if text.len() > 1 && text.contains(&b'/') {
        0.7
    } else {
        0.0
    }
}

fn confidence_url(text: &[u8]) -> f32 {
    let s = match std::str::from_utf8(text) {
        Ok(s) => s,
        Err(_) => return 0.0,
    };
    if s.starts_with("http://") || s.starts_with("https://") || s.starts_with("ftp://") {
        0.95
    } else {
        0.0
    }
}

fn confidence_severity(text: &[u8]) -> f32 {
    let Ok(s) = std::str::from_utf8(text) else {
        return 0.0;
    };
    let upper = s.to_ascii_uppercase();
    if SEVERITY_VOCAB.contains(&upper.as_str()) {
        0.97
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn labels(line: &[u8]) -> Vec<FieldType> {
        tokenize(line)
            .iter()
            .map(|t| classify(t).0)
            .collect()
    }

    #[test]
    fn test_severity_case_insensitive() {
        let tokens = tokenize(b"notice");
        assert_eq!(classify(&tokens[0]).0, FieldType::Severity);
        let tokens = tokenize(b"ERROR");
        assert_eq!(classify(&tokens[0]).0, FieldType::Severity);
    }

    #[test]
    fn test_ipv4_accepted_invalid_octet_rejected() {
        let tokens = tokenize(b"10.0.0.1");
        assert_eq!(classify(&tokens[0]).0, FieldType::Ipv4);
        let tokens = tokenize(b"999.0.0.1");
        assert_ne!(classify(&tokens[0]).0, FieldType::Ipv4);
    }

    #[test]
    fn test_uuid() {
        let tokens = tokenize(b"550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(classify(&tokens[0]).0, FieldType::Uuid);
    }

    #[test]
    fn test_integer_and_literal_fallback() {
        let tokens = tokenize(b"404");
        assert_eq!(classify(&tokens[0]).0, FieldType::Integer);
        let tokens = tokenize(b"LDAP");
        assert_eq!(classify(&tokens[0]).0, FieldType::Literal);
    }

    #[test]
    fn test_apache_line_word_labels() {
        let labels = labels(b"LDAP");
        assert_eq!(labels, vec![FieldType::Literal]);
    }
}
