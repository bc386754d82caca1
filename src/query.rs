//! Query executor (spec §4.7): predicate evaluation with column pruning
//! (never decode a column the predicate/projection doesn't touch) and
//! limit short-circuiting.

use crate::container::Container;
use crate::error::{ContainerError, QueryError};
use crate::field_type::FieldType;
use crate::template::{FieldValue, Slot};

/// A predicate over one line. Conjunctions are evaluated most-selective
/// first, per spec §4.7, so a cheap equality check can short-circuit
/// before a more expensive one runs.
#[derive(Debug, Clone)]
pub enum Predicate {
    SeverityIn(Vec<String>),
    Ipv4Eq(u32),
    TimestampInRange(i64, i64),
    And(Vec<Predicate>),
}

impl Predicate {
    /// Rough selectivity ranking used to order `And` branches, lower
    /// checked first: point equality before a range, a range before a
    /// broad membership test.
    fn selectivity_rank(&self) -> u8 {
        match self {
            Predicate::Ipv4Eq(_) => 0,
            Predicate::TimestampInRange(..) => 1,
            Predicate::SeverityIn(_) => 2,
            Predicate::And(_) => 3,
        }
    }

    fn field_type(&self) -> Option<FieldType> {
        match self {
            Predicate::SeverityIn(_) => Some(FieldType::Severity),
            Predicate::Ipv4Eq(_) => Some(FieldType::Ipv4),
            Predicate::TimestampInRange(..) => Some(FieldType::Timestamp),
            Predicate::And(_) => None,
        }
    }

    /// Flatten into non-`And` leaves, most selective first.
    fn leaves(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out.sort_by_key(|p| Predicate::selectivity_rank(p));
        out
    }
}

fn collect_leaves<'a>(p: &'a Predicate, out: &mut Vec<&'a Predicate>) {
    match p {
        Predicate::And(parts) => {
            for part in parts {
                collect_leaves(part, out);
            }
        }
        leaf => out.push(leaf),
    }
}

fn matches_leaf(leaf: &Predicate, value: &FieldValue) -> bool {
    match (leaf, value) {
        (Predicate::SeverityIn(wanted), FieldValue::Bytes(actual)) => wanted
            .iter()
            .any(|w| w.as_bytes().eq_ignore_ascii_case(actual)),
        (Predicate::Ipv4Eq(wanted), FieldValue::Ipv4(actual)) => wanted == actual,
        (Predicate::TimestampInRange(lo, hi), FieldValue::Timestamp(ms, _)) => ms >= lo && ms <= hi,
        _ => false,
    }
}

/// Column index (within a template's variable slots) of the first slot of
/// the given type, if the template's shape has one at all.
fn column_for(template_slots: &[Slot], field_type: FieldType) -> Option<usize> {
    template_slots
        .iter()
        .filter_map(|s| match s {
            Slot::Variable { field_type: ft, .. } => Some(*ft),
            Slot::Literal(_) => None,
        })
        .position(|ft| ft == field_type)
}

/// Footer-only, O(1) line count (spec §4.7/§6's `count(Container) -> u64`):
/// reads `footer.n_lines` and decodes nothing else. Survives corruption
/// anywhere in the body, since the body is never touched.
#[must_use]
pub fn count(container: &Container<'_>) -> u64 {
    container.n_lines()
}

/// Count lines matching `predicate`, without materializing them. Unlike
/// [`count`], this decodes every column the predicate references.
pub fn count_matching(container: &Container<'_>, predicate: &Predicate) -> Result<u64, QueryError> {
    Ok(filter(container, predicate, None)?.len() as u64)
}

/// Return the original-order line indices matching `predicate`, decoding
/// only the columns the predicate references. `limit` short-circuits the
/// scan once enough matches are found.
pub fn filter(
    container: &Container<'_>,
    predicate: &Predicate,
    limit: Option<usize>,
) -> Result<Vec<usize>, QueryError> {
    let tid_stream = container.tid_stream().map_err(|e| wrap(0, e))?;
    let templates = container.templates().map_err(|e| wrap(0, e))?;
    let leaves = predicate.leaves();

    // Per template, per leaf: the column index to check, or None if this
    // template's shape never carries that field type (every line of it
    // trivially fails that leaf, and the column is never decoded).
    let plan: Vec<Vec<Option<usize>>> = templates
        .iter()
        .map(|t| leaves.iter().map(|l| l.field_type().and_then(|ft| column_for(&t.slots, ft))).collect())
        .collect();

    let mut per_template_row = vec![0usize; templates.len()];
    drop(templates);
    let mut matches = Vec::new();
    for (line_idx, &template_id) in tid_stream.iter().enumerate() {
        let tid = template_id as usize;
        let row = per_template_row[tid];
        per_template_row[tid] += 1;

        let mut is_match = true;
        for (leaf, col) in leaves.iter().zip(&plan[tid]) {
            let Some(col) = col else {
                is_match = false;
                break;
            };
            let values = container.column(template_id, *col).map_err(|e| wrap(template_id, e))?;
            if !values.get(row).is_some_and(|v| matches_leaf(leaf, v)) {
                is_match = false;
                break;
            }
        }

        if is_match {
            matches.push(line_idx);
            if limit.is_some_and(|n| matches.len() >= n) {
                break;
            }
        }
    }
    Ok(matches)
}

fn wrap(template_id: u32, source: ContainerError) -> QueryError {
    QueryError::TemplateUnreadable { template_id, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectivity_ordering() {
        let p = Predicate::And(vec![
            Predicate::SeverityIn(vec!["ERROR".into()]),
            Predicate::Ipv4Eq(0),
        ]);
        let leaves = p.leaves();
        assert!(matches!(leaves[0], Predicate::Ipv4Eq(_)));
    }
}
