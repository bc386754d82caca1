//! Per-column codec layer (spec §4.5): encodes a typed [`Column`](crate::column::Column)
//! into one `ColumnBlock` — a tagged, self-describing byte span the
//! container writes verbatim into its body and the entropy pass (spec §6)
//! compresses as part of the larger block.
//!
//! Mirrors the teacher's `schema::blocks` in spirit: a small closed tag
//! space dispatches to a decoder, the way `BlockId` dispatches
//! `read::Reader::read_block`. Here the tag selects a *codec*, not a block
//! shape, since every column block has the same outer envelope.

pub mod dict;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bits::{Cursor, Writer};
use crate::column::Column;
use crate::error::{self, ContainerError, Section};
use crate::field_type::FieldType;
use crate::template::FieldValue;
use crate::timefmt::TimestampFormat;
use dict::Dictionary;

/// Wire tag selecting which codec produced a column's payload. Values are
/// spec.md §6's bit-exact codec-tag table; a reader built against the spec
/// must be able to dispatch on these numbers without consulting this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CodecTag {
    Raw = 0x01,
    Varint = 0x02,
    ZigzagVarint = 0x03,
    DeltaZigzagVarint = 0x04,
    DictVarintLocal = 0x05,
    DictVarintGlobal = 0x06,
    RleVarint = 0x07,
}

/// One self-describing encoded column: a tag, a length-prefixed codec
/// header (dictionary contents, base offsets, whatever the codec needs to
/// decode), and a length-prefixed payload.
#[derive(Debug, Clone)]
pub struct ColumnBlock {
    pub codec_tag: CodecTag,
    pub header: Vec<u8>,
    pub payload: Vec<u8>,
}

impl ColumnBlock {
    pub fn write(&self, w: &mut Writer) {
        w.write_u8(self.codec_tag.into());
        w.write_length_prefixed(&self.header);
        w.write_length_prefixed(&self.payload);
    }

    pub fn read(c: &mut Cursor<'_>) -> Result<Self, ContainerError> {
        let tag_byte = c.read_u8()?;
        let codec_tag = CodecTag::try_from(tag_byte).map_err(|_| ContainerError::UnknownCodecTag {
            tag: tag_byte,
            section: Section::ColumnBlock,
            offset: c.position() as u64,
        })?;
        let header_len = error::read_varint(c, Section::ColumnBlock)? as usize;
        let header = c.read_bytes(header_len)?.to_vec();
        let payload_len = error::read_varint(c, Section::ColumnBlock)? as usize;
        let payload = c.read_bytes(payload_len)?.to_vec();
        Ok(Self { codec_tag, header, payload })
    }
}

/// ZigZag-encode a signed integer into its unsigned wire form.
#[must_use]
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// HOST/PATH/URL/UUID (and the never-classified HEX/PROCESS_ID, which share
/// their Bytes-valued representation, see `DESIGN.md`) fall back to raw
/// length-prefixed storage once a local dictionary would cost more than it
/// saves (spec §4.5: "fall back to raw length-prefixed if cardinality ≥ 50%
/// of rows").
fn distinct_ratio_at_least_half(column: &Column) -> bool {
    if column.values.is_empty() {
        return false;
    }
    let mut seen = std::collections::HashSet::new();
    for value in &column.values {
        seen.insert(field_value_bytes(value));
    }
    seen.len() * 2 >= column.values.len()
}

/// Encode a column. `severity_dict` is the fixed global severity vocabulary
/// (spec §4.2). `token_pool` is the cross-template MESSAGE/QUOTED_STRING
/// pool (spec §9 design notes); other dictionary-coded types get a fresh
/// local dictionary scoped to this column, per spec §4.5.
pub fn encode_column(column: &Column, severity_dict: &Dictionary, token_pool: &Dictionary) -> ColumnBlock {
    match column.field_type {
        FieldType::Timestamp => encode_timestamps(column),
        FieldType::Integer => encode_integer(column),
        FieldType::Ipv4 => encode_dictionary(column, None),
        FieldType::Severity => encode_dictionary(column, Some(severity_dict)),
        FieldType::Host | FieldType::Path | FieldType::Url | FieldType::Uuid | FieldType::Hex | FieldType::ProcessId => {
            if distinct_ratio_at_least_half(column) {
                encode_raw(column)
            } else {
                encode_dictionary(column, None)
            }
        }
        FieldType::Message | FieldType::QuotedString => encode_dictionary(column, Some(token_pool)),
        _ => encode_raw(column),
    }
}

pub fn decode_column(
    block: &ColumnBlock,
    field_type: FieldType,
    row_count: usize,
    severity_dict: &Dictionary,
    token_pool: &Dictionary,
) -> Result<Vec<FieldValue>, ContainerError> {
    match block.codec_tag {
        CodecTag::DeltaZigzagVarint => decode_timestamps(block, row_count),
        CodecTag::Varint => decode_varint_unsigned(block, row_count),
        CodecTag::ZigzagVarint => decode_zigzag(block, row_count),
        CodecTag::DictVarintLocal => decode_dictionary(block, row_count, None),
        CodecTag::DictVarintGlobal => {
            let dict = if field_type == FieldType::Severity { severity_dict } else { token_pool };
            decode_dictionary(block, row_count, Some(dict))
        }
        CodecTag::Raw => decode_raw(block, row_count),
        CodecTag::RleVarint => Err(ContainerError::MalformedSlot {
            section: Section::ColumnBlock,
            offset: 0,
            message: "RLE-varint is only valid for the template-id stream, not a column block".into(),
        }),
    }
}

fn timestamp_parts(value: &FieldValue) -> (i64, TimestampFormat) {
    match value {
        FieldValue::Timestamp(ms, fmt) => (*ms, *fmt),
        _ => unreachable!("encode_timestamps only sees TIMESTAMP columns"),
    }
}

fn format_tag(fmt: TimestampFormat) -> u8 {
    match fmt {
        TimestampFormat::IsoDate => 0,
        TimestampFormat::EpochSeconds => 1,
        TimestampFormat::EpochMillis => 2,
        TimestampFormat::ApacheClf => 3,
    }
}

fn format_from_tag(tag: u8) -> TimestampFormat {
    match tag {
        0 => TimestampFormat::IsoDate,
        1 => TimestampFormat::EpochSeconds,
        2 => TimestampFormat::EpochMillis,
        _ => TimestampFormat::ApacheClf,
    }
}

fn encode_timestamps(column: &Column) -> ColumnBlock {
    let mut payload = Writer::new();
    let mut formats = Writer::new();
    let mut prev = 0i64;
    for value in &column.values {
        let (ms, fmt) = timestamp_parts(value);
        payload.write_varint(zigzag_encode(ms - prev));
        formats.write_u8(format_tag(fmt));
        prev = ms;
    }
    ColumnBlock {
        codec_tag: CodecTag::DeltaZigzagVarint,
        header: formats.into_bytes(),
        payload: payload.into_bytes(),
    }
}

fn decode_timestamps(block: &ColumnBlock, row_count: usize) -> Result<Vec<FieldValue>, ContainerError> {
    let mut payload = Cursor::new(&block.payload);
    let mut prev = 0i64;
    let mut out = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let delta = zigzag_decode(error::read_varint(&mut payload, Section::ColumnBlock)?);
        prev += delta;
        let fmt = format_from_tag(*block.header.get(i).ok_or(ContainerError::MalformedSlot {
            section: Section::ColumnBlock,
            offset: i as u64,
            message: "missing timestamp format byte".into(),
        })?);
        out.push(FieldValue::Timestamp(prev, fmt));
    }
    Ok(out)
}

/// spec §4.5 distinguishes unsigned-small INTEGER (plain varint) from
/// signed INTEGER (zigzag then varint); we decide per column since a single
/// FieldType::Integer column may hold either, depending on the data.
fn encode_integer(column: &Column) -> ColumnBlock {
    let all_non_negative = column.values.iter().all(|v| match v {
        FieldValue::Int(v) => *v >= 0,
        FieldValue::UInt(_) => true,
        _ => unreachable!("encode_integer only sees integer-like columns"),
    });
    let mut payload = Writer::new();
    if all_non_negative {
        for value in &column.values {
            let v = match value {
                FieldValue::Int(v) => *v as u64,
                FieldValue::UInt(v) => *v,
                _ => unreachable!(),
            };
            payload.write_varint(v);
        }
        ColumnBlock { codec_tag: CodecTag::Varint, header: Vec::new(), payload: payload.into_bytes() }
    } else {
        for value in &column.values {
            let v = match value {
                FieldValue::Int(v) => *v,
                FieldValue::UInt(v) => *v as i64,
                _ => unreachable!(),
            };
            payload.write_varint(zigzag_encode(v));
        }
        ColumnBlock { codec_tag: CodecTag::ZigzagVarint, header: Vec::new(), payload: payload.into_bytes() }
    }
}

fn decode_varint_unsigned(block: &ColumnBlock, row_count: usize) -> Result<Vec<FieldValue>, ContainerError> {
    let mut payload = Cursor::new(&block.payload);
    let mut out = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        out.push(FieldValue::UInt(error::read_varint(&mut payload, Section::ColumnBlock)?));
    }
    Ok(out)
}

fn decode_zigzag(block: &ColumnBlock, row_count: usize) -> Result<Vec<FieldValue>, ContainerError> {
    let mut payload = Cursor::new(&block.payload);
    let mut out = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        out.push(FieldValue::Int(zigzag_decode(error::read_varint(&mut payload, Section::ColumnBlock)?)));
    }
    Ok(out)
}

fn field_value_bytes(value: &FieldValue) -> Vec<u8> {
    match value {
        FieldValue::Bytes(b) => b.clone(),
        FieldValue::Ipv4(v) => std::net::Ipv4Addr::from(*v).to_string().into_bytes(),
        FieldValue::Ipv6(v) => std::net::Ipv6Addr::from(*v).to_string().into_bytes(),
        FieldValue::Int(v) => v.to_string().into_bytes(),
        FieldValue::UInt(v) => v.to_string().into_bytes(),
        FieldValue::Timestamp(ms, fmt) => crate::timefmt::render(*fmt, *ms),
    }
}

fn encode_dictionary(column: &Column, fixed_dict: Option<&Dictionary>) -> ColumnBlock {
    let values: Vec<Vec<u8>> = column.values.iter().map(field_value_bytes).collect();
    let dict = match fixed_dict {
        Some(d) => d.clone(),
        None => Dictionary::build(values.iter().map(Vec::as_slice)),
    };
    let mut payload = Writer::new();
    for v in &values {
        let id = dict.id_of(v).expect("every value was folded into the dictionary");
        payload.write_varint(id as u64);
    }
    let mut header = Writer::new();
    // A local dictionary serializes its contents; a global dictionary
    // (severity, token pool) writes zero entries, the reader already has
    // its own copy and is never told to trust one read from a column.
    if fixed_dict.is_none() {
        dict.write(&mut header);
    } else {
        header.write_varint(0);
    }
    let codec_tag = if fixed_dict.is_none() { CodecTag::DictVarintLocal } else { CodecTag::DictVarintGlobal };
    ColumnBlock { codec_tag, header: header.into_bytes(), payload: payload.into_bytes() }
}

fn decode_dictionary(
    block: &ColumnBlock,
    row_count: usize,
    fixed_dict: Option<&Dictionary>,
) -> Result<Vec<FieldValue>, ContainerError> {
    let mut header = Cursor::new(&block.header);
    let local = Dictionary::read(&mut header, Section::ColumnBlock)?;
    let dict = fixed_dict.unwrap_or(&local);
    let mut payload = Cursor::new(&block.payload);
    let mut out = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let id = error::read_varint(&mut payload, Section::ColumnBlock)? as usize;
        let bytes = dict.value_of(id).ok_or(ContainerError::DictionaryIdOutOfRange {
            id: id as u64,
            size: dict.len(),
            section: Section::ColumnBlock,
            offset: payload.position() as u64,
        })?;
        out.push(FieldValue::Bytes(bytes.to_vec()));
    }
    Ok(out)
}

fn encode_raw(column: &Column) -> ColumnBlock {
    let mut payload = Writer::new();
    for value in &column.values {
        payload.write_length_prefixed(&field_value_bytes(value));
    }
    ColumnBlock { codec_tag: CodecTag::Raw, header: Vec::new(), payload: payload.into_bytes() }
}

fn decode_raw(block: &ColumnBlock, row_count: usize) -> Result<Vec<FieldValue>, ContainerError> {
    let mut payload = Cursor::new(&block.payload);
    let mut out = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let len = error::read_varint(&mut payload, Section::ColumnBlock)? as usize;
        out.push(FieldValue::Bytes(payload.read_bytes(len)?.to_vec()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;

    #[test]
    fn test_zigzag_roundtrip() {
        for v in [0i64, -1, 1, i64::MIN, i64::MAX, -1234, 1234] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn test_timestamp_column_roundtrip() {
        let column = Column {
            field_type: FieldType::Timestamp,
            values: vec![
                FieldValue::Timestamp(1_000, TimestampFormat::EpochSeconds),
                FieldValue::Timestamp(61_000, TimestampFormat::EpochSeconds),
            ],
        };
        let severity_dict = Dictionary::build(std::iter::empty());
        let token_pool = Dictionary::build(std::iter::empty());
        let block = encode_column(&column, &severity_dict, &token_pool);
        assert_eq!(block.codec_tag, CodecTag::DeltaZigzagVarint);
        let decoded = decode_column(&block, FieldType::Timestamp, 2, &severity_dict, &token_pool).unwrap();
        assert!(matches!(decoded[0], FieldValue::Timestamp(1_000, TimestampFormat::EpochSeconds)));
        assert!(matches!(decoded[1], FieldValue::Timestamp(61_000, TimestampFormat::EpochSeconds)));
    }

    #[test]
    fn test_dictionary_column_roundtrip() {
        let column = Column {
            field_type: FieldType::Host,
            values: vec![
                FieldValue::Bytes(b"alpha.example.com".to_vec()),
                FieldValue::Bytes(b"beta.example.com".to_vec()),
                FieldValue::Bytes(b"alpha.example.com".to_vec()),
            ],
        };
        let severity_dict = Dictionary::build(std::iter::empty());
        let token_pool = Dictionary::build(std::iter::empty());
        let block = encode_column(&column, &severity_dict, &token_pool);
        assert_eq!(block.codec_tag, CodecTag::DictVarintLocal);
        let decoded = decode_column(&block, FieldType::Host, 3, &severity_dict, &token_pool).unwrap();
        let FieldValue::Bytes(first) = &decoded[0] else { panic!() };
        let FieldValue::Bytes(third) = &decoded[2] else { panic!() };
        assert_eq!(first, third);
        assert_eq!(first, b"alpha.example.com");
    }

    #[test]
    fn test_high_cardinality_host_column_falls_back_to_raw() {
        // 4 distinct values across 4 rows: 100% cardinality, over the 50%
        // threshold, so the dictionary would cost more than it saves.
        let column = Column {
            field_type: FieldType::Host,
            values: vec![
                FieldValue::Bytes(b"a.example.com".to_vec()),
                FieldValue::Bytes(b"b.example.com".to_vec()),
                FieldValue::Bytes(b"c.example.com".to_vec()),
                FieldValue::Bytes(b"d.example.com".to_vec()),
            ],
        };
        let severity_dict = Dictionary::build(std::iter::empty());
        let token_pool = Dictionary::build(std::iter::empty());
        let block = encode_column(&column, &severity_dict, &token_pool);
        assert_eq!(block.codec_tag, CodecTag::Raw);
        let decoded = decode_column(&block, FieldType::Host, 4, &severity_dict, &token_pool).unwrap();
        let FieldValue::Bytes(b) = &decoded[2] else { panic!() };
        assert_eq!(b, b"c.example.com");
    }

    #[test]
    fn test_signed_integer_column_uses_zigzag_tag() {
        let column = Column {
            field_type: FieldType::Integer,
            values: vec![FieldValue::Int(-5), FieldValue::Int(3)],
        };
        let severity_dict = Dictionary::build(std::iter::empty());
        let token_pool = Dictionary::build(std::iter::empty());
        let block = encode_column(&column, &severity_dict, &token_pool);
        assert_eq!(block.codec_tag, CodecTag::ZigzagVarint);
        let decoded = decode_column(&block, FieldType::Integer, 2, &severity_dict, &token_pool).unwrap();
        assert!(matches!(decoded[0], FieldValue::Int(-5)));
        assert!(matches!(decoded[1], FieldValue::Int(3)));
    }

    #[test]
    fn test_non_negative_integer_column_uses_plain_varint_tag() {
        let column = Column {
            field_type: FieldType::Integer,
            values: vec![FieldValue::Int(5), FieldValue::Int(3)],
        };
        let severity_dict = Dictionary::build(std::iter::empty());
        let token_pool = Dictionary::build(std::iter::empty());
        let block = encode_column(&column, &severity_dict, &token_pool);
        assert_eq!(block.codec_tag, CodecTag::Varint);
        let decoded = decode_column(&block, FieldType::Integer, 2, &severity_dict, &token_pool).unwrap();
        assert!(matches!(decoded[0], FieldValue::UInt(5)));
        assert!(matches!(decoded[1], FieldValue::UInt(3)));
    }
}
