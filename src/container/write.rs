//! Container serialization: lines in, compressed bytes out.

use tracing::debug;

use crate::bits::Writer;
use crate::codec::dict::Dictionary;
use crate::codec;
use crate::column::{build_columns, Column};
use crate::config::CompressionConfig;
use crate::entropy;
use crate::error::Error;
use crate::field_type::FieldType;
use crate::template::{self, FieldValue, Slot, Template};

use super::{ColumnLocation, ContainerFlags, Footer, HEADER_LEN, MAGIC, VERSION};

/// Ceiling on the trained dictionary's own size — independent of how many
/// sample bytes (`config.dict_train_bytes`) fed the trainer.
const MAX_DICTIONARY_SIZE: usize = 112 * 1024;

/// Compress an ordered sequence of log lines into a self-contained
/// `LSC1` byte stream (spec §6). Every section (template table, token pool,
/// tid stream, each column block) is wrapped in its own independent zstd
/// frame rather than one frame over the whole body — see `DESIGN.md` for
/// why, and how that stays consistent with spec §6's bit-exact contract.
pub fn write(lines: &[&[u8]], config: &CompressionConfig) -> Result<Vec<u8>, Error> {
    let template_config = config.to_template_config();
    let extracted = template::extract(lines, &template_config)?;

    let columns_per_template = build_columns(&extracted.templates, &extracted.records);
    let severity_dict = Dictionary::severity();
    let token_pool = build_token_pool(&extracted.templates, &columns_per_template);

    let blocks_per_template: Vec<Vec<Vec<u8>>> = columns_per_template
        .iter()
        .map(|columns| {
            columns
                .iter()
                .map(|column| {
                    let block = codec::encode_column(column, &severity_dict, &token_pool);
                    let mut w = Writer::new();
                    block.write(&mut w);
                    w.into_bytes()
                })
                .collect()
        })
        .collect();

    let dict = train_dictionary(&blocks_per_template, config.dict_train_bytes);
    let dict_ref = dict.as_deref();

    let mut body = Vec::new();

    let template_table = compress_section(
        &serialize_template_table(&extracted.templates),
        config.entropy_level,
        dict_ref,
    )?;
    let template_table_loc = append_section(&mut body, &template_table);

    let globals = compress_section(&serialize_globals(&token_pool), config.entropy_level, dict_ref)?;
    let globals_loc = append_section(&mut body, &globals);

    let tid_stream = compress_section(
        &serialize_tid_stream(&extracted.records),
        config.entropy_level,
        dict_ref,
    )?;
    let tid_stream_loc = append_section(&mut body, &tid_stream);

    let mut column_locations: Vec<Vec<ColumnLocation>> = Vec::with_capacity(blocks_per_template.len());
    for blocks in &blocks_per_template {
        let mut locs = Vec::with_capacity(blocks.len());
        for raw in blocks {
            let compressed = compress_section(raw, config.entropy_level, dict_ref)?;
            locs.push(append_section(&mut body, &compressed));
        }
        column_locations.push(locs);
    }

    let dictionary_loc = dict_ref.map(|d| append_section(&mut body, d));

    let crc32 = crc32fast::hash(&body);
    let footer = Footer {
        n_lines: lines.len() as u64,
        n_templates: extracted.templates.len() as u32,
        template_table: template_table_loc,
        globals: globals_loc,
        tid_stream: tid_stream_loc,
        columns: column_locations,
        dictionary: dictionary_loc,
        crc32,
    };

    let footer_bytes = serialize_footer(&footer);
    let footer_offset = HEADER_LEN as u64 + body.len() as u64;

    let mut flags = ContainerFlags::empty();
    if dictionary_loc.is_some() {
        flags |= ContainerFlags::DICTIONARY_PRESENT;
    }

    let mut out = Vec::with_capacity(footer_offset as usize + footer_bytes.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&flags.bits().to_le_bytes());
    out.extend_from_slice(&footer_offset.to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&footer_bytes);

    debug!(
        lines = lines.len(),
        templates = extracted.templates.len(),
        bytes = out.len(),
        dictionary_trained = dict_ref.is_some(),
        "container written"
    );
    Ok(out)
}

/// Train a zstd dictionary on up to `max_sample_bytes` of raw column-block
/// payloads (spec §4.5: "a small dictionary trained on the first megabyte
/// of column payloads"). Zero disables training entirely.
fn train_dictionary(blocks_per_template: &[Vec<Vec<u8>>], max_sample_bytes: usize) -> Option<Vec<u8>> {
    if max_sample_bytes == 0 {
        return None;
    }
    let mut samples = Vec::new();
    let mut collected = 0usize;
    'outer: for blocks in blocks_per_template {
        for raw in blocks {
            samples.push(raw.clone());
            collected += raw.len();
            if collected >= max_sample_bytes {
                break 'outer;
            }
        }
    }
    entropy::train_dictionary(&samples, MAX_DICTIONARY_SIZE)
}

fn append_section(body: &mut Vec<u8>, compressed: &[u8]) -> ColumnLocation {
    let offset = body.len() as u64;
    body.extend_from_slice(compressed);
    ColumnLocation {
        offset,
        compressed_len: compressed.len() as u64,
    }
}

fn compress_section(bytes: &[u8], level: i32, dict: Option<&[u8]>) -> Result<Vec<u8>, Error> {
    Ok(entropy::compress_with_dict(bytes, level, dict)?)
}

/// Every distinct MESSAGE/QUOTED_STRING value across every template,
/// shared in one pool so repeated phrases dedupe across templates too
/// (spec §9 design notes).
fn build_token_pool(templates: &[Template], columns_per_template: &[Vec<Column>]) -> Dictionary {
    let mut values: Vec<Vec<u8>> = Vec::new();
    for (template, columns) in templates.iter().zip(columns_per_template) {
        let mut col_iter = columns.iter();
        for slot in &template.slots {
            let Slot::Variable { field_type, .. } = slot else {
                continue;
            };
            let column = col_iter.next().expect("one column per variable slot");
            if matches!(field_type, FieldType::Message | FieldType::QuotedString) {
                for value in &column.values {
                    if let FieldValue::Bytes(b) = value {
                        values.push(b.clone());
                    }
                }
            }
        }
    }
    Dictionary::build(values.iter().map(Vec::as_slice))
}

fn serialize_template_table(templates: &[Template]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_varint(templates.len() as u64);
    for template in templates {
        w.write_varint(template.slots.len() as u64);
        for slot in &template.slots {
            match slot {
                Slot::Literal(bytes) => {
                    w.write_u8(0);
                    w.write_length_prefixed(bytes);
                }
                Slot::Variable { field_type, .. } => {
                    w.write_u8(1);
                    w.write_u8((*field_type).into());
                }
            }
        }
    }
    w.into_bytes()
}

fn serialize_globals(token_pool: &Dictionary) -> Vec<u8> {
    let mut w = Writer::new();
    token_pool.write(&mut w);
    w.into_bytes()
}

/// RLE-with-escape (spec §4.5): runs of the same consecutive template id
/// collapse to one `(id, run_length)` pair.
fn serialize_tid_stream(records: &[template::LineRecord]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_varint(records.len() as u64);
    let mut i = 0usize;
    while i < records.len() {
        let id = records[i].template_id;
        let mut run = 1u64;
        while i + (run as usize) < records.len() && records[i + run as usize].template_id == id {
            run += 1;
        }
        w.write_varint(u64::from(id));
        w.write_varint(run);
        i += run as usize;
    }
    w.into_bytes()
}

fn serialize_footer(footer: &Footer) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_u64_le(footer.n_lines);
    w.write_u32_le(footer.n_templates);
    write_location(&mut w, footer.template_table);
    write_location(&mut w, footer.globals);
    write_location(&mut w, footer.tid_stream);
    w.write_varint(footer.columns.len() as u64);
    for per_template in &footer.columns {
        w.write_varint(per_template.len() as u64);
        for loc in per_template {
            write_location(&mut w, *loc);
        }
    }
    match footer.dictionary {
        Some(loc) => {
            w.write_u8(1);
            write_location(&mut w, loc);
        }
        None => w.write_u8(0),
    }
    w.write_u32_le(footer.crc32);
    w.into_bytes()
}

fn write_location(w: &mut Writer, loc: ColumnLocation) {
    w.write_u64_le(loc.offset);
    w.write_u64_le(loc.compressed_len);
}
