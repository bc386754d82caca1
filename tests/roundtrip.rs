//! End-to-end compress -> decompress byte-identity tests.

use lscompress::{compress, decompress_all, CompressionConfig};

fn roundtrip(lines: &[&[u8]], config: &CompressionConfig) -> Vec<Vec<u8>> {
    let bytes = compress(lines, config).expect("compress should succeed");
    decompress_all(&bytes).expect("decompress should succeed")
}

#[test]
fn apache_style_three_lines() {
    let lines: Vec<&[u8]> = vec![
        b"[Thu Jun 09 06:07:04 2005] [notice] LDAP: Built with OpenLDAP",
        b"[Thu Jun 09 06:07:05 2005] [notice] LDAP: SSL support unavailable",
        b"[Thu Jun 09 06:07:06 2005] [error] LDAP: lookup failed",
    ];
    let out = roundtrip(&lines, &CompressionConfig::default());
    assert_eq!(out.len(), lines.len());
    for (original, rebuilt) in lines.iter().zip(out.iter()) {
        assert_eq!(*original, rebuilt.as_slice());
    }
}

#[test]
fn singleton_line() {
    let lines: Vec<&[u8]> = vec![b"system boot complete"];
    let out = roundtrip(&lines, &CompressionConfig::default());
    assert_eq!(out, vec![lines[0].to_vec()]);
}

#[test]
fn unmatched_tail_absorbed_and_reconstructed_exactly() {
    let mut owned: Vec<String> = (0..1000).map(|i| format!("worker-{i} heartbeat ok")).collect();
    owned.push("totally different shaped outlier line here".to_string());
    owned.push("another oddly shaped outlier line entirely".to_string());
    let lines: Vec<&[u8]> = owned.iter().map(|s| s.as_bytes()).collect();

    let config = CompressionConfig {
        min_support: 3,
        ..CompressionConfig::default()
    };
    let out = roundtrip(&lines, &config);
    assert_eq!(out.len(), lines.len());
    for (original, rebuilt) in lines.iter().zip(out.iter()) {
        assert_eq!(*original, rebuilt.as_slice());
    }
}

#[test]
fn empty_and_non_empty_lines_reconstruct_exactly() {
    let lines: Vec<&[u8]> = vec![b"", b"hello", b"", b"hello again"];
    let out = roundtrip(&lines, &CompressionConfig::default());
    for (original, rebuilt) in lines.iter().zip(out.iter()) {
        assert_eq!(*original, rebuilt.as_slice());
    }
}

#[test]
fn whitespace_inside_lines_is_preserved() {
    let lines: Vec<&[u8]> = vec![
        b"alpha   beta\tgamma",
        b"alpha   beta\tgamma",
        b"alpha   beta\tgamma",
    ];
    let out = roundtrip(&lines, &CompressionConfig::default());
    for (original, rebuilt) in lines.iter().zip(out.iter()) {
        assert_eq!(*original, rebuilt.as_slice());
    }
}

#[test]
fn codec_determinism_same_input_same_bytes() {
    let lines: Vec<&[u8]> = vec![b"[notice] one", b"[notice] two", b"[error] three"];
    let config = CompressionConfig::default();
    let a = compress(&lines, &config).unwrap();
    let b = compress(&lines, &config).unwrap();
    assert_eq!(a, b);
}
