//! The closed field-type vocabulary (spec §3), one byte on the wire.
//!
//! Plays the role the teacher's `schema::blocks::BlockId` plays for block
//! IDs: a fixed, `num_enum`-backed tag that is authoritative once a line
//! has been bound into a template.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FieldType {
    Timestamp = 0,
    Severity = 1,
    Ipv4 = 2,
    Ipv6 = 3,
    Integer = 4,
    Hex = 5,
    Uuid = 6,
    Host = 7,
    ProcessId = 8,
    Path = 9,
    Url = 10,
    QuotedString = 11,
    Message = 12,
    Literal = 13,
    Whitespace = 14,
}

impl FieldType {
    /// Classifier priority order from spec §4.2, highest first. Ties are
    /// broken by whichever pattern in this list accepts the token first.
    pub const CLASSIFIER_PRIORITY: [FieldType; 11] = [
        FieldType::Uuid,
        FieldType::Ipv4,
        FieldType::Ipv6,
        FieldType::Timestamp,
        FieldType::Integer,
        FieldType::Host,
        FieldType::Path,
        FieldType::Url,
        FieldType::QuotedString,
        FieldType::Severity,
        FieldType::ProcessId,
    ];

    /// Whether a column of this type participates in the variable-slot
    /// machinery. `Literal` and `Whitespace` never become columns: literal
    /// bytes live in the template shape, and whitespace is folded into
    /// adjacent literal slots during tokenization (spec §4.1).
    #[must_use]
    pub fn is_variable(self) -> bool {
        !matches!(self, FieldType::Literal | FieldType::Whitespace)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Severity => "SEVERITY",
            FieldType::Ipv4 => "IPV4",
            FieldType::Ipv6 => "IPV6",
            FieldType::Integer => "INTEGER",
            FieldType::Hex => "HEX",
            FieldType::Uuid => "UUID",
            FieldType::Host => "HOST",
            FieldType::ProcessId => "PROCESS_ID",
            FieldType::Path => "PATH",
            FieldType::Url => "URL",
            FieldType::QuotedString => "QUOTED_STRING",
            FieldType::Message => "MESSAGE",
            FieldType::Literal => "LITERAL",
            FieldType::Whitespace => "WHITESPACE",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tag_roundtrip() {
        for tag in 0u8..=14 {
            let ft = FieldType::try_from(tag).unwrap();
            let back: u8 = ft.into();
            assert_eq!(tag, back);
        }
        assert!(FieldType::try_from(15u8).is_err());
    }
}
