//! Crate-wide error types.
//!
//! Each layer gets its own error type, the way the teacher splits
//! `bits::Error` from `read::Error`; the crate-level [`Error`] wraps all of
//! them with `#[from]` so a caller that doesn't care which layer failed can
//! still match on `kind()` and `section()` per spec §7.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bits::{self, Cursor};

/// Named wire sections, used to report where a fault was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Section {
    Header = 0,
    Body = 1,
    TemplateTable = 2,
    GlobalDictionaries = 3,
    TemplateIdStream = 4,
    ColumnBlock = 5,
    Footer = 6,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Body => "body",
            Self::TemplateTable => "template_table",
            Self::GlobalDictionaries => "global_dictionaries",
            Self::TemplateIdStream => "template_id_stream",
            Self::ColumnBlock => "column_block",
            Self::Footer => "footer",
        })
    }
}

/// Template-extraction errors (spec §4.3).
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template budget exceeded: {count} templates exceeds ceiling {ceiling}")]
    TemplateBudgetExceeded { count: usize, ceiling: usize },
}

/// Container read/write errors (spec §6, §7).
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("invalid magic at offset {offset}: expected `LSC1`")]
    InvalidMagic { offset: u64 },
    #[error("unsupported version {version} at offset {offset}")]
    UnsupportedVersion { version: u16, offset: u64 },
    #[error("truncated container in {section}: needed {needed} bytes, had {available}")]
    TruncatedContainer {
        section: Section,
        needed: usize,
        available: usize,
    },
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    #[error("unknown codec tag 0x{tag:02x} at offset {offset} in {section}")]
    UnknownCodecTag {
        tag: u8,
        section: Section,
        offset: u64,
    },
    #[error("dictionary id {id} out of range (size {size}) in {section} at offset {offset}")]
    DictionaryIdOutOfRange {
        id: u64,
        size: usize,
        section: Section,
        offset: u64,
    },
    #[error("varint overflow in {section} at offset {offset}")]
    VarintOverflow { section: Section, offset: u64 },
    #[error("entropy decode failed: {message}")]
    EntropyDecodeFailed { message: String },
    #[error("malformed slot in {section} at offset {offset}: {message}")]
    MalformedSlot {
        section: Section,
        offset: u64,
        message: String,
    },
    #[error(transparent)]
    ReadBits(#[from] bits::Error),
}

impl ContainerError {
    #[must_use]
    pub fn section(&self) -> Option<Section> {
        match self {
            Self::TruncatedContainer { section, .. }
            | Self::UnknownCodecTag { section, .. }
            | Self::DictionaryIdOutOfRange { section, .. }
            | Self::VarintOverflow { section, .. }
            | Self::MalformedSlot { section, .. } => Some(*section),
            Self::InvalidMagic { .. } => Some(Section::Header),
            Self::UnsupportedVersion { .. } => Some(Section::Header),
            Self::ChecksumMismatch { .. } => Some(Section::Footer),
            Self::EntropyDecodeFailed { .. } => Some(Section::Body),
            Self::ReadBits(_) => None,
        }
    }
}

/// Query-execution errors (spec §4.7).
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("template {template_id} is unreadable: {source}")]
    TemplateUnreadable {
        template_id: u32,
        #[source]
        source: ContainerError,
    },
}

/// Top-level crate error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Read a varint, attributing a [`ContainerError::VarintOverflow`] (spec §7:
/// "every error carries kind, section, byte offset") to the section and the
/// offset the varint started at, rather than losing that context through the
/// bare `#[from] bits::Error` conversion.
pub(crate) fn read_varint(c: &mut Cursor<'_>, section: Section) -> std::result::Result<u64, ContainerError> {
    let start = c.position() as u64;
    c.read_varint().map_err(|e| match e {
        bits::Error::VarintOverflow => ContainerError::VarintOverflow { section, offset: start },
        other => ContainerError::ReadBits(other),
    })
}
