//! Predicate soundness and column-pruning behavior.

use lscompress::container::Container;
use lscompress::field_type::FieldType;
use lscompress::query::{count, count_matching, filter, Predicate};
use lscompress::template::Slot;
use lscompress::{compress, CompressionConfig};

#[test]
fn severity_filter_returns_only_matching_line() {
    let lines: Vec<&[u8]> = vec![
        b"[Thu Jun 09 06:07:04 2005] [notice] LDAP: Built with OpenLDAP",
        b"[Thu Jun 09 06:07:05 2005] [notice] LDAP: SSL support unavailable",
        b"[Thu Jun 09 06:07:06 2005] [error] LDAP: lookup failed",
    ];
    let bytes = compress(&lines, &CompressionConfig::default()).unwrap();
    let container = Container::open(&bytes).unwrap();

    let predicate = Predicate::SeverityIn(vec!["error".to_string()]);
    let matches = filter(&container, &predicate, None).unwrap();
    assert_eq!(matches, vec![2]);
    assert_eq!(count_matching(&container, &predicate).unwrap(), 1);
}

#[test]
fn timestamp_range_returns_expected_window() {
    let base = 1_000_000_000i64;
    let owned: Vec<String> = (0..1000)
        .map(|i| format!("{}", base + i))
        .collect();
    let lines: Vec<&[u8]> = owned.iter().map(|s| s.as_bytes()).collect();
    let bytes = compress(&lines, &CompressionConfig::default()).unwrap();
    let container = Container::open(&bytes).unwrap();

    let predicate = Predicate::TimestampInRange((base + 100) * 1000, (base + 199) * 1000);
    let matches = filter(&container, &predicate, None).unwrap();
    assert_eq!(matches.len(), 100);
    assert_eq!(matches[0], 100);
    assert_eq!(*matches.last().unwrap(), 199);
}

#[test]
fn ipv4_miss_returns_no_matches() {
    let lines: Vec<&[u8]> = vec![b"connect 10.0.0.1 ok", b"connect 10.0.0.2 ok", b"connect 10.0.0.1 ok"];
    let config = CompressionConfig { min_support: 1, ..CompressionConfig::default() };
    let bytes = compress(&lines, &config).unwrap();
    let container = Container::open(&bytes).unwrap();

    let missing = u32::from(std::net::Ipv4Addr::new(10, 0, 0, 3));
    let predicate = Predicate::Ipv4Eq(missing);
    let matches = filter(&container, &predicate, None).unwrap();
    assert!(matches.is_empty());
}

#[test]
fn limit_returns_first_k_matches_in_order() {
    let owned: Vec<String> = (0..50).map(|i| format!("[notice] item {i}")).collect();
    let lines: Vec<&[u8]> = owned.iter().map(|s| s.as_bytes()).collect();
    let config = CompressionConfig { min_support: 1, ..CompressionConfig::default() };
    let bytes = compress(&lines, &config).unwrap();
    let container = Container::open(&bytes).unwrap();

    let predicate = Predicate::SeverityIn(vec!["notice".to_string()]);
    let matches = filter(&container, &predicate, Some(5)).unwrap();
    assert_eq!(matches, vec![0, 1, 2, 3, 4]);
}

/// S6: corrupting one template's column payload must not take down
/// footer-only `count()` or a query that never touches that template —
/// only `verify_checksum()` (called explicitly) should notice.
#[test]
fn corruption_in_one_template_does_not_break_unrelated_queries() {
    let lines: Vec<&[u8]> = vec![
        b"[notice] LDAP: one",
        b"[notice] LDAP: two",
        b"[error] LDAP: three",
        b"connect to host alpha failed",
        b"connect to host beta failed",
        b"connect to host gamma failed",
    ];
    let mut bytes = compress(&lines, &CompressionConfig::default()).unwrap();

    let (other_template_id, other_column_index) = {
        let container = Container::open(&bytes).unwrap();
        let templates = container.templates().unwrap();
        let severity_tid = templates
            .iter()
            .find(|t| has_field_type(&t.slots, FieldType::Severity))
            .map(|t| t.id)
            .expect("one template carries a SEVERITY column");
        let other = templates
            .iter()
            .find(|t| t.id != severity_tid && t.slots.iter().any(|s| matches!(s, Slot::Variable { .. })))
            .expect("a second template with at least one variable column");
        (other.id, 0usize)
    };

    let corrupt_loc = {
        let container = Container::open(&bytes).unwrap();
        container.footer.columns[other_template_id as usize][other_column_index]
    };
    let flip_at = lscompress::container::HEADER_LEN + corrupt_loc.offset as usize + (corrupt_loc.compressed_len as usize / 2);
    bytes[flip_at] ^= 0xFF;

    let container = Container::open(&bytes).expect("open must not eagerly validate body checksums");
    assert_eq!(count(&container), 6);

    let predicate = Predicate::SeverityIn(vec!["error".to_string()]);
    let matches = filter(&container, &predicate, None).expect("unrelated template's query must still succeed");
    assert_eq!(matches, vec![2]);

    assert!(
        container.column(other_template_id, other_column_index).is_err(),
        "the corrupted column itself should fail to decode"
    );
    assert!(container.verify_checksum().is_err(), "verify_checksum must detect the corruption");
}

fn has_field_type(slots: &[Slot], field_type: FieldType) -> bool {
    slots
        .iter()
        .any(|s| matches!(s, Slot::Variable { field_type: ft, .. } if *ft == field_type))
}
