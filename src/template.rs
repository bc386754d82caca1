//! Template extractor (spec §4.3): recovers a minimal set of templates such
//! that every input line matches exactly one, subject to a minimum-support
//! constraint, and is the largest single component of this crate (spec
//! budget: 25%).
//!
//! Shape bucketing and alignment merge (spec §4.3 steps 1 and 3) are fused
//! into one exact-shape grouping pass here: grouping lines by (literal
//! bytes | field type) at every position already produces the aligned
//! result that iterative per-position agreement would converge to, since
//! two lines land in the same bucket only when every position already
//! agrees. The separate iterative merge spec §4.3 describes is needed only
//! when bucketing is coarser than that (e.g. label-only, ignoring literal
//! text); doing the finer bucketing up front gets the same templates with
//! one pass instead of two. Recorded as an Open Question resolution in
//! DESIGN.md.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::classify::classify;
use crate::error::TemplateError;
use crate::field_type::FieldType;
use crate::timefmt::{month_from_abbrev, ymd_hms_to_epoch_ms, TimestampFormat};
use crate::token::{tokenize, Token, TokenKind};

/// One semantic unit of a line after tokenization, classification, and
/// composite folding (multi-token timestamps, IPv6 addresses).
#[derive(Debug, Clone)]
pub struct Elem {
    pub field_type: FieldType,
    pub text: Vec<u8>,
    pub parsed: Option<ParsedValue>,
}

#[derive(Debug, Clone, Copy)]
pub enum ParsedValue {
    Int(i64),
    UInt(u64),
    Ipv4(u32),
    Ipv6(u128),
    Timestamp(i64, TimestampFormat),
}

/// A decoded value for one variable slot of one line, ready for a column
/// builder (spec §4.4). `Bytes` covers string-valued types (HOST, PATH,
/// URL, QUOTED_STRING, MESSAGE, HEX, UUID) verbatim. `Timestamp` carries
/// the recognized textual shape alongside the epoch-ms value so the
/// TIMESTAMP codec (delta+zigzag+varint, spec §4.5) can store only the
/// numeric value and still reproduce the original bytes exactly on read.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Ipv4(u32),
    Ipv6(u128),
    Timestamp(i64, TimestampFormat),
}

#[derive(Debug, Clone)]
pub enum Slot {
    Literal(Vec<u8>),
    Variable {
        field_type: FieldType,
        column_index: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Template {
    pub id: u32,
    pub slots: Vec<Slot>,
}

impl Template {
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Variable { .. }))
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct LineRecord {
    pub template_id: u32,
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub min_support: usize,
    pub template_ceiling: usize,
    pub absorption_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_support: 3,
            template_ceiling: 10_000,
            absorption_threshold: 0.8,
        }
    }
}

pub struct ExtractOutput {
    pub templates: Vec<Template>,
    pub records: Vec<LineRecord>,
}

/// Shape key used for exact grouping (spec §4.3 step 1/3 fused, see module
/// doc). Cheap to hash: literal positions carry their bytes, variable
/// positions carry only the field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ShapeElem {
    Literal(Vec<u8>),
    Var(FieldType),
}

type ShapeKey = Vec<ShapeElem>;

fn shape_key(elems: &[Elem]) -> ShapeKey {
    elems
        .iter()
        .map(|e| {
            if e.field_type.is_variable() {
                ShapeElem::Var(e.field_type)
            } else {
                ShapeElem::Literal(e.text.clone())
            }
        })
        .collect()
}

fn slots_from_elems(elems: &[Elem]) -> Vec<Slot> {
    let mut column_index = 0usize;
    elems
        .iter()
        .map(|e| {
            if e.field_type.is_variable() {
                let slot = Slot::Variable {
                    field_type: e.field_type,
                    column_index,
                };
                column_index += 1;
                slot
            } else {
                Slot::Literal(e.text.clone())
            }
        })
        .collect()
}

/// Working (pre-canonicalization) template: slots plus the original-order
/// line indices currently assigned to it.
struct Building {
    slots: Vec<Slot>,
    line_indices: Vec<usize>,
}

/// Run tokenizer + classifier + composite folding over one line.
fn elems_for_line(line: &[u8]) -> Vec<Elem> {
    let tokens = tokenize(line);
    let labeled: Vec<(Token<'_>, FieldType)> = tokens
        .iter()
        .map(|t| {
            let (ft, _confidence) = classify(t);
            (*t, ft)
        })
        .collect();

    let folded = fold_composites(line, &labeled);
    coalesce_literals(folded)
}

/// Merge consecutive LITERAL/WHITESPACE elements into one literal run, and
/// attempt composite multi-token field folding (timestamps, IPv6) before
/// that. Composite folding runs first because it needs to see raw
/// token-level LITERAL delimiters (e.g. `:`) that coalescing would erase.
fn fold_composites(line: &[u8], labeled: &[(Token<'_>, FieldType)]) -> Vec<Elem> {
    let mut out = Vec::with_capacity(labeled.len());
    let mut i = 0usize;
    while i < labeled.len() {
        if let Some((end, elem)) = try_fold_apache_timestamp(line, labeled, i) {
            out.push(elem);
            i = end;
            continue;
        }
        if let Some((end, elem)) = try_fold_ipv6(line, labeled, i) {
            out.push(elem);
            i = end;
            continue;
        }
        let (token, field_type) = labeled[i];
        out.push(elem_from_token(&token, field_type));
        i += 1;
    }
    out
}

fn elem_from_token(token: &Token<'_>, field_type: FieldType) -> Elem {
    let parsed = match field_type {
        FieldType::Integer => std::str::from_utf8(token.text)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(ParsedValue::Int),
        FieldType::Ipv4 => parse_ipv4(token.text).map(ParsedValue::Ipv4),
        FieldType::Timestamp => parse_single_token_timestamp(token.text),
        _ => None,
    };
    Elem {
        field_type,
        text: token.text.to_vec(),
        parsed,
    }
}

fn parse_ipv4(text: &[u8]) -> Option<u32> {
    let s = std::str::from_utf8(text).ok()?;
    let mut out: u32 = 0;
    let mut n = 0;
    for part in s.split('.') {
        let v: u32 = part.parse().ok()?;
        if v > 255 {
            return None;
        }
        out = (out << 8) | v;
        n += 1;
    }
    (n == 4).then_some(out)
}

fn parse_single_token_timestamp(text: &[u8]) -> Option<ParsedValue> {
    let s = std::str::from_utf8(text).ok()?;
    if s.len() == 10 && s.as_bytes()[4] == b'-' && s.as_bytes()[7] == b'-' {
        let y: i64 = s[0..4].parse().ok()?;
        let m: u32 = s[5..7].parse().ok()?;
        let d: u32 = s[8..10].parse().ok()?;
        let ms = ymd_hms_to_epoch_ms(y, m, d, 0, 0, 0);
        return Some(ParsedValue::Timestamp(ms, TimestampFormat::IsoDate));
    }
    if s.len() == 10 && s.bytes().all(|b| b.is_ascii_digit()) {
        let v: i64 = s.parse().ok()?;
        return Some(ParsedValue::Timestamp(v * 1000, TimestampFormat::EpochSeconds));
    }
    if s.len() == 13 && s.bytes().all(|b| b.is_ascii_digit()) {
        let v: i64 = s.parse().ok()?;
        return Some(ParsedValue::Timestamp(v, TimestampFormat::EpochMillis));
    }
    None
}

/// Fold `Weekday Month Day HH:MM:SS Year` (Apache error-log style) into one
/// TIMESTAMP element. Returns the exclusive end index and the folded
/// element on success.
fn try_fold_apache_timestamp(
    line: &[u8],
    labeled: &[(Token<'_>, FieldType)],
    start: usize,
) -> Option<(usize, Elem)> {
    let kind_at = |i: usize| labeled.get(i).map(|(t, _)| t.kind);
    let text_at = |i: usize| labeled.get(i).map(|(t, _)| t.text);

    let mut i = start;
    if kind_at(i) != Some(TokenKind::Word) {
        return None;
    }
    i += 1;
    if kind_at(i) != Some(TokenKind::Whitespace) {
        return None;
    }
    i += 1;
    let month = month_from_abbrev(text_at(i)?)?;
    if kind_at(i) != Some(TokenKind::Word) {
        return None;
    }
    i += 1;
    if kind_at(i) != Some(TokenKind::Whitespace) {
        return None;
    }
    i += 1;
    if kind_at(i) != Some(TokenKind::Number) {
        return None;
    }
    let day: u32 = std::str::from_utf8(text_at(i)?).ok()?.parse().ok()?;
    i += 1;
    if kind_at(i) != Some(TokenKind::Whitespace) {
        return None;
    }
    i += 1;
    if kind_at(i) != Some(TokenKind::Number) {
        return None;
    }
    let hour: u32 = std::str::from_utf8(text_at(i)?).ok()?.parse().ok()?;
    i += 1;
    if kind_at(i) != Some(TokenKind::Delimiter(b':')) {
        return None;
    }
    i += 1;
    if kind_at(i) != Some(TokenKind::Number) {
        return None;
    }
    let minute: u32 = std::str::from_utf8(text_at(i)?).ok()?.parse().ok()?;
    i += 1;
    if kind_at(i) != Some(TokenKind::Delimiter(b':')) {
        return None;
    }
    i += 1;
    if kind_at(i) != Some(TokenKind::Number) {
        return None;
    }
    let second: u32 = std::str::from_utf8(text_at(i)?).ok()?.parse().ok()?;
    i += 1;
    if kind_at(i) != Some(TokenKind::Whitespace) {
        return None;
    }
    i += 1;
    if kind_at(i) != Some(TokenKind::Number) {
        return None;
    }
    let year_text = text_at(i)?;
    if year_text.len() != 4 {
        return None;
    }
    let year: i64 = std::str::from_utf8(year_text).ok()?.parse().ok()?;
    let end = i + 1;

    let epoch_ms = ymd_hms_to_epoch_ms(year, month, day, hour, minute, second);
    let span_start = labeled[start].0.offset;
    let span_end = labeled[end - 1].0.end();
    trace!(epoch_ms, "folded apache-style timestamp");
    Some((
        end,
        Elem {
            field_type: FieldType::Timestamp,
            text: line[span_start..span_end].to_vec(),
            parsed: Some(ParsedValue::Timestamp(epoch_ms, TimestampFormat::ApacheClf)),
        },
    ))
}

/// Fold a `:`-delimited hex group run (`::1`, `fe80::1`, `2001:db8::8a2e`)
/// into one IPV6 element. Colons are tokenizer delimiters, so an IPv6
/// address otherwise arrives as an alternating Word/Number + `:` sequence.
fn try_fold_ipv6(
    line: &[u8],
    labeled: &[(Token<'_>, FieldType)],
    start: usize,
) -> Option<(usize, Elem)> {
    let is_hex_group = |t: &Token<'_>| {
        t.len() <= 4 && t.text.iter().all(|b| b.is_ascii_hexdigit())
    };
    let mut i = start;
    let mut colon_count = 0usize;
    let mut saw_group = false;
    loop {
        match labeled.get(i) {
            Some((t, _)) if t.kind == TokenKind::Delimiter(b':') => {
                colon_count += 1;
                i += 1;
            }
            Some((t, _)) if (t.kind == TokenKind::Word || t.kind == TokenKind::Number) && is_hex_group(t) => {
                saw_group = true;
                i += 1;
            }
            _ => break,
        }
    }
    if colon_count < 2 || !saw_group || i == start {
        return None;
    }
    let span_start = labeled[start].0.offset;
    let span_end = labeled[i - 1].0.end();
    let text = &line[span_start..span_end];
    let value = parse_ipv6_best_effort(text);
    Some((
        i,
        Elem {
            field_type: FieldType::Ipv6,
            text: text.to_vec(),
            parsed: Some(ParsedValue::Ipv6(value)),
        },
    ))
}

fn parse_ipv6_best_effort(text: &[u8]) -> u128 {
    let s = String::from_utf8_lossy(text);
    s.parse::<std::net::Ipv6Addr>()
        .map(|a| u128::from_be_bytes(a.octets()))
        .unwrap_or(0)
}

/// Merge consecutive LITERAL/WHITESPACE elements into single literal runs.
fn coalesce_literals(elems: Vec<Elem>) -> Vec<Elem> {
    let mut out: Vec<Elem> = Vec::with_capacity(elems.len());
    for e in elems {
        let is_literal_like = matches!(e.field_type, FieldType::Literal | FieldType::Whitespace);
        if is_literal_like {
            if let Some(last) = out.last_mut() {
                if matches!(last.field_type, FieldType::Literal | FieldType::Whitespace) {
                    last.text.extend_from_slice(&e.text);
                    last.field_type = FieldType::Literal;
                    continue;
                }
            }
            out.push(Elem {
                field_type: FieldType::Literal,
                ..e
            });
        } else {
            out.push(e);
        }
    }
    out
}

/// Position-wise agreement between a candidate line's elements and an
/// existing template's slots, used by greedy absorption (spec §4.3 step 4).
fn agreement(slots: &[Slot], elems: &[Elem]) -> f32 {
    if slots.len() != elems.len() || slots.is_empty() {
        return 0.0;
    }
    let matches = slots
        .iter()
        .zip(elems)
        .filter(|(slot, elem)| match slot {
            Slot::Literal(bytes) => {
                elem.field_type == FieldType::Literal && bytes == &elem.text
            }
            Slot::Variable { field_type, .. } => *field_type == elem.field_type,
        })
        .count();
    matches as f32 / slots.len() as f32
}

/// Widen every disagreeing position in `slots` to `Variable(MESSAGE)`,
/// renumbering column indices left to right (spec §4.3 step 4: "widening
/// disagreeing positions to MESSAGE").
fn widen_to_message(slots: &[Slot], elems: &[Elem]) -> Vec<Slot> {
    let widened: Vec<bool> = slots
        .iter()
        .zip(elems)
        .map(|(slot, elem)| match slot {
            Slot::Literal(bytes) => !(elem.field_type == FieldType::Literal && bytes == &elem.text),
            Slot::Variable { field_type, .. } => *field_type != elem.field_type,
        })
        .collect();
    let mut column_index = 0usize;
    slots
        .iter()
        .zip(widened)
        .map(|(slot, widen)| {
            if widen {
                let s = Slot::Variable {
                    field_type: FieldType::Message,
                    column_index,
                };
                column_index += 1;
                s
            } else {
                match slot {
                    Slot::Literal(bytes) => Slot::Literal(bytes.clone()),
                    Slot::Variable { field_type, .. } => {
                        let s = Slot::Variable {
                            field_type: *field_type,
                            column_index,
                        };
                        column_index += 1;
                        s
                    }
                }
            }
        })
        .collect()
}

fn elem_to_field_value(field_type: FieldType, elem: &Elem) -> FieldValue {
    match (field_type, elem.parsed) {
        (FieldType::Integer, Some(ParsedValue::Int(v))) => FieldValue::Int(v),
        (FieldType::Ipv4, Some(ParsedValue::Ipv4(v))) => FieldValue::Ipv4(v),
        (FieldType::Ipv6, Some(ParsedValue::Ipv6(v))) => FieldValue::Ipv6(v),
        (FieldType::Timestamp, Some(ParsedValue::Timestamp(v, fmt))) => FieldValue::Timestamp(v, fmt),
        _ => FieldValue::Bytes(elem.text.clone()),
    }
}

/// Extract templates and per-line records from an ordered sequence of
/// input lines (trailing newlines already stripped by the caller).
pub fn extract(lines: &[&[u8]], config: &Config) -> Result<ExtractOutput, TemplateError> {
    let elems_per_line: Vec<Vec<Elem>> = lines.iter().map(|l| elems_for_line(l)).collect();

    // Dedicated empty template, unconditional per spec §4.1, but only
    // materialized when at least one line is actually empty.
    let empty_line_indices: Vec<usize> = elems_per_line
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_empty())
        .map(|(i, _)| i)
        .collect();

    let mut accepted: Vec<Building> = Vec::new();
    if !empty_line_indices.is_empty() {
        accepted.push(Building {
            slots: Vec::new(),
            line_indices: empty_line_indices,
        });
    }

    let mut groups: HashMap<ShapeKey, Vec<usize>> = HashMap::new();
    let mut group_order: Vec<ShapeKey> = Vec::new();

    for (i, elems) in elems_per_line.iter().enumerate() {
        if elems.is_empty() {
            continue;
        }
        let key = shape_key(elems);
        if !groups.contains_key(&key) {
            group_order.push(key.clone());
        }
        groups.entry(key).or_default().push(i);
    }

    // Support filter: groups below min_support re-enter as "unmatched".
    let mut unmatched: Vec<usize> = Vec::new();
    for key in group_order {
        let line_indices = groups.remove(&key).unwrap();
        if line_indices.len() >= config.min_support {
            let slots = slots_from_elems(&elems_per_line[line_indices[0]]);
            accepted.push(Building { slots, line_indices });
        } else {
            unmatched.extend(line_indices);
        }
    }
    unmatched.sort_unstable();
    debug!(
        accepted = accepted.len(),
        unmatched = unmatched.len(),
        "shape bucketing complete"
    );

    // Greedy absorption for what support filtering rejected.
    for &line_idx in &unmatched {
        let elems = &elems_per_line[line_idx];
        let best = accepted
            .iter()
            .enumerate()
            .map(|(idx, b)| (idx, agreement(&b.slots, elems)))
            .filter(|(_, score)| *score > 0.0)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        match best {
            Some((idx, score)) if score >= config.absorption_threshold => {
                if score < 1.0 {
                    warn!(line_idx, score, "absorbing line, widening disagreeing slots to MESSAGE");
                    accepted[idx].slots = widen_to_message(&accepted[idx].slots, elems);
                }
                accepted[idx].line_indices.push(line_idx);
            }
            _ => {
                trace!(line_idx, "no template reached absorption threshold, emitting singleton");
                accepted.push(Building {
                    slots: slots_from_elems(elems),
                    line_indices: vec![line_idx],
                });
            }
        }
    }

    if accepted.len() > config.template_ceiling {
        return Err(TemplateError::TemplateBudgetExceeded {
            count: accepted.len(),
            ceiling: config.template_ceiling,
        });
    }

    // Canonicalize: template_id in order of first appearance.
    let mut order: Vec<usize> = (0..accepted.len()).collect();
    order.sort_by_key(|&idx| accepted[idx].line_indices.iter().min().copied().unwrap_or(usize::MAX));

    let mut line_to_template: HashMap<usize, u32> = HashMap::new();
    let mut templates = Vec::with_capacity(accepted.len());
    for (new_id, &old_idx) in order.iter().enumerate() {
        for &line_idx in &accepted[old_idx].line_indices {
            line_to_template.insert(line_idx, new_id as u32);
        }
        templates.push(Template {
            id: new_id as u32,
            slots: accepted[old_idx].slots.clone(),
        });
    }

    let mut records = Vec::with_capacity(lines.len());
    for (i, elems) in elems_per_line.iter().enumerate() {
        let template_id = line_to_template[&i];
        let slots = &templates[template_id as usize].slots;
        let mut values = Vec::with_capacity(slots.len());
        for (slot, elem) in slots.iter().zip(elems.iter()) {
            if let Slot::Variable { field_type, .. } = slot {
                values.push(elem_to_field_value(*field_type, elem));
            }
        }
        records.push(LineRecord { template_id, values });
    }

    debug!(templates = templates.len(), lines = lines.len(), "template extraction complete");
    Ok(ExtractOutput { templates, records })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of<'a>(v: &'a [&'a str]) -> Vec<&'a [u8]> {
        v.iter().map(|s| s.as_bytes()).collect()
    }

    #[test]
    fn test_apache_style_single_template() {
        let lines = [
            "[Thu Jun 09 06:07:04 2005] [notice] LDAP: Built with OpenLDAP",
            "[Thu Jun 09 06:07:05 2005] [notice] LDAP: SSL support unavailable",
            "[Thu Jun 09 06:07:06 2005] [error] LDAP: lookup failed",
        ];
        let out = extract(&lines_of(&lines), &Config::default()).unwrap();
        let non_empty: Vec<_> = out
            .templates
            .iter()
            .filter(|t| !t.slots.is_empty())
            .collect();
        assert_eq!(non_empty.len(), 1);
        // TIMESTAMP, SEVERITY, and the trailing message text widened to
        // MESSAGE by absorption (no shape meets min_support on its own).
        assert_eq!(non_empty[0].variable_count(), 3);
    }

    #[test]
    fn test_singleton_line() {
        let lines = ["system boot complete"];
        let out = extract(&lines_of(&lines), &Config::default()).unwrap();
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_minority_shape_absorbed_widened_to_message() {
        let mut lines: Vec<String> = (0..1000)
            .map(|i| format!("[notice] worker-{i} heartbeat ok"))
            .collect();
        lines.push("[notice] totally different shaped line here now".to_string());
        lines.push("[notice] another oddly shaped outlier line".to_string());
        let refs: Vec<&[u8]> = lines.iter().map(|s| s.as_bytes()).collect();
        let out = extract(&refs, &Config::default()).unwrap();
        let non_empty: Vec<_> = out.templates.iter().filter(|t| !t.slots.is_empty()).collect();
        assert_eq!(non_empty.len(), 1, "all lines should collapse into one template");
    }

    #[test]
    fn test_empty_line_gets_dedicated_template() {
        let lines = ["", "hello", ""];
        let out = extract(&lines_of(&lines), &Config::default()).unwrap();
        assert_eq!(out.records[0].template_id, out.records[2].template_id);
        let empty_template = &out.templates[out.records[0].template_id as usize];
        assert!(empty_template.slots.is_empty());
    }

    #[test]
    fn test_template_budget_exceeded() {
        let lines: Vec<String> = (0..5).map(|i| format!("distinct-shape-{i}")).collect();
        let refs: Vec<&[u8]> = lines.iter().map(|s| s.as_bytes()).collect();
        let cfg = Config {
            min_support: 1,
            template_ceiling: 2,
            absorption_threshold: 0.8,
        };
        assert!(matches!(
            extract(&refs, &cfg),
            Err(TemplateError::TemplateBudgetExceeded { .. })
        ));
    }
}
