//! Container deserialization: footer-first, lazy per-section decode so a
//! query only pays for the columns it actually references (spec §4.7).
//!
//! `open` never decodes the body: it parses the header, slices out the
//! footer (stored outside any entropy frame at a known offset), and stops.
//! The template table, token pool, tid stream, and every column stay
//! compressed until something asks for them, and the footer's checksum is
//! never consulted automatically — see `verify_checksum` and `DESIGN.md`
//! for why a corrupted column must not prevent a footer-only `count()` or
//! a query that never touches it.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;

use tracing::debug;

use crate::bits::Cursor;
use crate::codec::dict::Dictionary;
use crate::codec::{self, ColumnBlock};
use crate::entropy;
use crate::error::{self, ContainerError, Section};
use crate::field_type::FieldType;
use crate::template::{FieldValue, Slot, Template};

use super::{ColumnLocation, ContainerFlags, Footer, ReaderState, HEADER_LEN, MAGIC, VERSION};

/// An opened, footer-parsed container. Column payloads, the template
/// table, and the token pool are decompressed lazily and cached the first
/// time a query touches them.
pub struct Container<'input> {
    bytes: &'input [u8],
    footer_offset: u64,
    pub flags: ContainerFlags,
    pub footer: Footer,
    /// Raw (never entropy-coded) trained dictionary bytes, read eagerly at
    /// `open` time — a plain bounds-checked slice, not a decompression, so
    /// it can't fail on body corruption elsewhere.
    dictionary: Option<Vec<u8>>,
    templates_cache: RefCell<Option<Vec<Template>>>,
    token_pool_cache: RefCell<Option<Dictionary>>,
    severity_dict: Dictionary,
    state: RefCell<ReaderState>,
    column_cache: RefCell<HashMap<(u32, usize), Vec<FieldValue>>>,
    tid_stream_cache: RefCell<Option<Vec<u32>>>,
}

impl<'input> Container<'input> {
    /// Parse the header and locate the footer. No body section is decoded
    /// and no checksum is verified here; see [`Self::verify_checksum`].
    pub fn open(bytes: &'input [u8]) -> Result<Self, ContainerError> {
        let mut header = Cursor::new(bytes);
        let magic = header.read_bytes(4)?;
        if magic != MAGIC {
            return Err(ContainerError::InvalidMagic { offset: 0 });
        }
        let version = u16::from_le_bytes(header.read_bytes(2)?.try_into().unwrap());
        if version != VERSION {
            return Err(ContainerError::UnsupportedVersion { version, offset: 4 });
        }
        let flags_raw = u16::from_le_bytes(header.read_bytes(2)?.try_into().unwrap());
        let flags = ContainerFlags::from_bits_truncate(flags_raw);
        let footer_offset = header.read_u64_le()?;
        debug!(version, footer_offset, "container header parsed");

        let footer_bytes = bytes
            .get(footer_offset as usize..)
            .ok_or(ContainerError::TruncatedContainer {
                section: Section::Footer,
                needed: footer_offset as usize,
                available: bytes.len(),
            })?;
        let footer = parse_footer(footer_bytes)?;
        debug!("footer parsed");

        let dictionary = match footer.dictionary {
            Some(loc) if flags.contains(ContainerFlags::DICTIONARY_PRESENT) => {
                Some(raw_section_bytes(bytes, loc)?.to_vec())
            }
            _ => None,
        };

        Ok(Self {
            bytes,
            footer_offset,
            flags,
            footer,
            dictionary,
            templates_cache: RefCell::new(None),
            token_pool_cache: RefCell::new(None),
            severity_dict: Dictionary::severity(),
            state: RefCell::new(ReaderState::FooterRead),
            column_cache: RefCell::new(HashMap::new()),
            tid_stream_cache: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn state(&self) -> ReaderState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn n_lines(&self) -> u64 {
        self.footer.n_lines
    }

    /// Recompute the CRC32 over the raw compressed body and compare it
    /// against the footer's recorded value (spec §7's `ChecksumMismatch`).
    /// Never called automatically by `open`, `count`, `filter`, or
    /// `column` — callers who want whole-file integrity assurance opt in
    /// explicitly, so a single corrupted section never blocks queries
    /// against the rest of the container (spec §7, S6).
    pub fn verify_checksum(&self) -> Result<(), ContainerError> {
        let body = self
            .bytes
            .get(HEADER_LEN..self.footer_offset as usize)
            .ok_or(ContainerError::TruncatedContainer {
                section: Section::Body,
                needed: self.footer_offset as usize,
                available: self.bytes.len(),
            })?;
        let computed = crc32fast::hash(body);
        if computed != self.footer.crc32 {
            return Err(ContainerError::ChecksumMismatch {
                expected: self.footer.crc32,
                computed,
            });
        }
        Ok(())
    }

    /// First successful body-section decode moves the reader past
    /// `BodyDecoded` straight to `Ready`: nothing else distinguishes the
    /// two states in this design (see `DESIGN.md`).
    fn mark_body_decoded(&self) {
        *self.state.borrow_mut() = ReaderState::Ready;
    }

    fn ensure_templates(&self) -> Result<(), ContainerError> {
        if self.templates_cache.borrow().is_some() {
            return Ok(());
        }
        let bytes = read_section(self.bytes, self.dictionary.as_deref(), self.footer.template_table)?;
        let templates = parse_template_table(&bytes)?;
        *self.templates_cache.borrow_mut() = Some(templates);
        self.mark_body_decoded();
        Ok(())
    }

    /// Decoded template table. Decompressed and parsed on first access.
    pub fn templates(&self) -> Result<Ref<'_, Vec<Template>>, ContainerError> {
        self.ensure_templates()?;
        Ok(Ref::map(self.templates_cache.borrow(), |o| o.as_ref().unwrap()))
    }

    fn ensure_token_pool(&self) -> Result<(), ContainerError> {
        if self.token_pool_cache.borrow().is_some() {
            return Ok(());
        }
        let bytes = read_section(self.bytes, self.dictionary.as_deref(), self.footer.globals)?;
        let mut c = Cursor::new(&bytes);
        let token_pool = Dictionary::read(&mut c, Section::GlobalDictionaries)?;
        *self.token_pool_cache.borrow_mut() = Some(token_pool);
        self.mark_body_decoded();
        Ok(())
    }

    fn token_pool(&self) -> Result<Ref<'_, Dictionary>, ContainerError> {
        self.ensure_token_pool()?;
        Ok(Ref::map(self.token_pool_cache.borrow(), |o| o.as_ref().unwrap()))
    }

    /// Decoded template id of every line, in original order. Cached after
    /// the first call.
    pub fn tid_stream(&self) -> Result<Vec<u32>, ContainerError> {
        if let Some(cached) = self.tid_stream_cache.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let bytes = read_section(self.bytes, self.dictionary.as_deref(), self.footer.tid_stream)?;
        let mut c = Cursor::new(&bytes);
        let n = error::read_varint(&mut c, Section::TemplateIdStream)? as usize;
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let id = error::read_varint(&mut c, Section::TemplateIdStream)? as u32;
            let run = error::read_varint(&mut c, Section::TemplateIdStream)?;
            for _ in 0..run {
                out.push(id);
            }
        }
        *self.tid_stream_cache.borrow_mut() = Some(out.clone());
        self.mark_body_decoded();
        Ok(out)
    }

    /// Decode one column of one template, from cache if already touched.
    pub fn column(&self, template_id: u32, column_index: usize) -> Result<Vec<FieldValue>, ContainerError> {
        let key = (template_id, column_index);
        if let Some(cached) = self.column_cache.borrow().get(&key) {
            return Ok(cached.clone());
        }
        let templates = self.templates()?;
        let template = templates.get(template_id as usize).ok_or(ContainerError::MalformedSlot {
            section: Section::ColumnBlock,
            offset: 0,
            message: format!("unknown template id {template_id}"),
        })?;
        let field_type = variable_field_type(template, column_index).ok_or(ContainerError::MalformedSlot {
            section: Section::ColumnBlock,
            offset: 0,
            message: format!("template {template_id} has no variable column {column_index}"),
        })?;
        let loc = *self
            .footer
            .columns
            .get(template_id as usize)
            .and_then(|cols| cols.get(column_index))
            .ok_or(ContainerError::MalformedSlot {
                section: Section::ColumnBlock,
                offset: 0,
                message: format!("no column directory entry for template {template_id} column {column_index}"),
            })?;
        drop(templates);
        let row_count = self.row_count_of(template_id)?;
        let bytes = read_section(self.bytes, self.dictionary.as_deref(), loc)?;
        let mut c = Cursor::new(&bytes);
        let block = ColumnBlock::read(&mut c)?;
        let token_pool = self.token_pool()?;
        let values = codec::decode_column(&block, field_type, row_count, &self.severity_dict, &token_pool)?;
        drop(token_pool);
        self.column_cache.borrow_mut().insert(key, values.clone());
        self.mark_body_decoded();
        Ok(values)
    }

    fn row_count_of(&self, template_id: u32) -> Result<usize, ContainerError> {
        Ok(self.tid_stream()?.iter().filter(|&&id| id == template_id).count())
    }
}

fn variable_field_type(template: &Template, column_index: usize) -> Option<FieldType> {
    template
        .slots
        .iter()
        .filter_map(|s| match s {
            Slot::Variable { field_type, .. } => Some(*field_type),
            Slot::Literal(_) => None,
        })
        .nth(column_index)
}

/// Slice a section's bytes straight out of the container without
/// decompressing — used only for the embedded dictionary, which is stored
/// raw (spec: sections must be decompressed *with* this dictionary, so the
/// dictionary itself can't be compressed with it).
fn raw_section_bytes(bytes: &[u8], loc: ColumnLocation) -> Result<&[u8], ContainerError> {
    let start = HEADER_LEN + loc.offset as usize;
    let end = start + loc.compressed_len as usize;
    bytes.get(start..end).ok_or(ContainerError::TruncatedContainer {
        section: Section::Body,
        needed: end,
        available: bytes.len(),
    })
}

fn read_section(bytes: &[u8], dict: Option<&[u8]>, loc: ColumnLocation) -> Result<Vec<u8>, ContainerError> {
    let compressed = raw_section_bytes(bytes, loc)?;
    entropy::decompress_with_dict(compressed, dict)
}

fn parse_footer(bytes: &[u8]) -> Result<Footer, ContainerError> {
    let mut c = Cursor::new(bytes);
    let n_lines = c.read_u64_le()?;
    let n_templates = c.read_u32_le()?;
    let template_table = read_location(&mut c)?;
    let globals = read_location(&mut c)?;
    let tid_stream = read_location(&mut c)?;
    let n_with_columns = error::read_varint(&mut c, Section::Footer)? as usize;
    let mut columns = Vec::with_capacity(n_with_columns);
    for _ in 0..n_with_columns {
        let n_cols = error::read_varint(&mut c, Section::Footer)? as usize;
        let mut locs = Vec::with_capacity(n_cols);
        for _ in 0..n_cols {
            locs.push(read_location(&mut c)?);
        }
        columns.push(locs);
    }
    let has_dictionary = c.read_u8()? != 0;
    let dictionary = if has_dictionary { Some(read_location(&mut c)?) } else { None };
    let crc32 = c.read_u32_le()?;
    Ok(Footer {
        n_lines,
        n_templates,
        template_table,
        globals,
        tid_stream,
        columns,
        dictionary,
        crc32,
    })
}

fn read_location(c: &mut Cursor<'_>) -> Result<ColumnLocation, ContainerError> {
    Ok(ColumnLocation {
        offset: c.read_u64_le()?,
        compressed_len: c.read_u64_le()?,
    })
}

fn parse_template_table(bytes: &[u8]) -> Result<Vec<Template>, ContainerError> {
    let mut c = Cursor::new(bytes);
    let n_templates = error::read_varint(&mut c, Section::TemplateTable)? as usize;
    let mut templates = Vec::with_capacity(n_templates);
    for id in 0..n_templates {
        let n_slots = error::read_varint(&mut c, Section::TemplateTable)? as usize;
        let mut slots = Vec::with_capacity(n_slots);
        let mut column_index = 0usize;
        for _ in 0..n_slots {
            let tag = c.read_u8()?;
            match tag {
                0 => {
                    let len = error::read_varint(&mut c, Section::TemplateTable)? as usize;
                    slots.push(Slot::Literal(c.read_bytes(len)?.to_vec()));
                }
                1 => {
                    let ft_byte = c.read_u8()?;
                    let field_type = FieldType::try_from(ft_byte).map_err(|_| ContainerError::MalformedSlot {
                        section: Section::TemplateTable,
                        offset: c.position() as u64,
                        message: format!("unknown field type tag {ft_byte}"),
                    })?;
                    slots.push(Slot::Variable { field_type, column_index });
                    column_index += 1;
                }
                other => {
                    return Err(ContainerError::MalformedSlot {
                        section: Section::TemplateTable,
                        offset: c.position() as u64,
                        message: format!("unknown slot tag {other}"),
                    })
                }
            }
        }
        templates.push(Template { id: id as u32, slots });
    }
    Ok(templates)
}
