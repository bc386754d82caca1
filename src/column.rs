//! Column builders (spec §4.4): materialize one row-aligned column per
//! variable slot of a template, in original line order.

use crate::field_type::FieldType;
use crate::template::{FieldValue, LineRecord, Template};

/// One typed, row-aligned column. Row `k` always corresponds to the k-th
/// line (in original input order) assigned to the owning template.
#[derive(Debug, Clone)]
pub struct Column {
    pub field_type: FieldType,
    pub values: Vec<FieldValue>,
}

impl Column {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build every column for every template from the flat, original-order
/// record list the template extractor produced. `templates` must be
/// indexed by `template_id`.
#[must_use]
pub fn build_columns(templates: &[Template], records: &[LineRecord]) -> Vec<Vec<Column>> {
    let mut columns: Vec<Vec<Column>> = templates
        .iter()
        .map(|t| {
            t.slots
                .iter()
                .filter_map(|slot| match slot {
                    crate::template::Slot::Variable { field_type, .. } => Some(Column {
                        field_type: *field_type,
                        values: Vec::new(),
                    }),
                    crate::template::Slot::Literal(_) => None,
                })
                .collect()
        })
        .collect();

    for record in records {
        let cols = &mut columns[record.template_id as usize];
        for (col, value) in cols.iter_mut().zip(record.values.iter()) {
            col.values.push(value.clone());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{extract, Config};

    #[test]
    fn test_columns_are_row_aligned() {
        let lines: Vec<&[u8]> = vec![
            b"worker [1] ready",
            b"worker [2] ready",
            b"worker [9] crashed",
        ];
        let cfg = Config {
            min_support: 1,
            ..Config::default()
        };
        let out = extract(&lines, &cfg).unwrap();
        let cols = build_columns(&out.templates, &out.records);
        let template = out.records[0].template_id as usize;
        assert_eq!(out.records[1].template_id as usize, template);
        assert_eq!(cols[template][0].len(), 2);
    }
}
