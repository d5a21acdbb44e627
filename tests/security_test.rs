//! Security Tests
//!
//! 信頼できないテンプレートに対する防御を検証します。
//! ZIP bomb（エントリ数・展開サイズ）、パストラバーサル、外部実体参照を扱います。

use std::io::{Cursor, Write};

use odtfill::{
    extract, inspect, ExtractionError, OdtFillError, OutputFormat, ProposalGenerator,
    ProposalGeneratorBuilder, RebuildError, SecurityConfig, SubstitutionMapping,
};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// 指定したエントリを持つODTを作成する（`content.xml`は常に含む）
fn odt_with_entries(extra: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/vnd.oasis.opendocument.text")
        .unwrap();
    zip.start_file("content.xml", stored).unwrap();
    zip.write_all(b"<text:p>&lt;Cliente&gt;</text:p>").unwrap();

    for (name, data) in extra {
        zip.start_file(*name, stored).unwrap();
        zip.write_all(data).unwrap();
    }

    zip.finish().unwrap().into_inner()
}

fn generator_with(security: SecurityConfig) -> ProposalGenerator {
    ProposalGeneratorBuilder::new()
        .with_output_format(OutputFormat::Odt)
        .with_security_config(security)
        .build()
        .unwrap()
}

fn mapping() -> SubstitutionMapping {
    let mut mapping = SubstitutionMapping::new();
    mapping.insert_field("Cliente", "Acme");
    mapping
}

/// ZIP bomb攻撃のテスト: 大量のエントリを含むアーカイブ
#[test]
fn test_zip_bomb_too_many_entries() {
    let names: Vec<String> = (0..10).map(|i| format!("Pictures/{}.png", i)).collect();
    let extra: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"x"[..])).collect();
    let template = odt_with_entries(&extra);

    let generator = generator_with(SecurityConfig {
        max_entry_count: 5,
        ..SecurityConfig::default()
    });
    let result = generator.merge(&template, &mapping());

    match result {
        Err(OdtFillError::Extraction(ExtractionError::SecurityViolation(msg))) => {
            assert!(msg.contains("too many entries"));
        }
        other => panic!("Expected SecurityViolation, got {:?}", other.map(|_| ())),
    }
}

/// ZIP bomb攻撃のテスト: 展開後の合計サイズが上限を超えるアーカイブ
#[test]
fn test_zip_bomb_large_decompressed_size() {
    let block = vec![0u8; 4096];
    let template = odt_with_entries(&[
        ("Pictures/a.png", block.as_slice()),
        ("Pictures/b.png", block.as_slice()),
    ]);

    let generator = generator_with(SecurityConfig {
        max_decompressed_size: 6_000,
        ..SecurityConfig::default()
    });
    let result = generator.merge(&template, &mapping());

    match result {
        Err(OdtFillError::Extraction(ExtractionError::SecurityViolation(msg))) => {
            assert!(msg.contains("Total decompressed size"));
        }
        other => panic!("Expected SecurityViolation, got {:?}", other.map(|_| ())),
    }
}

/// 単一エントリのサイズ上限
#[test]
fn test_single_entry_too_large() {
    let block = vec![7u8; 2048];
    let template = odt_with_entries(&[("Pictures/big.png", block.as_slice())]);

    let generator = generator_with(SecurityConfig {
        max_entry_size: 1024,
        ..SecurityConfig::default()
    });
    let result = generator.merge(&template, &mapping());

    match result {
        Err(OdtFillError::Extraction(ExtractionError::SecurityViolation(msg))) => {
            assert!(msg.contains("Pictures/big.png"));
        }
        other => panic!("Expected SecurityViolation, got {:?}", other.map(|_| ())),
    }
}

/// 入力サイズの上限
#[test]
fn test_input_size_limit() {
    let template = odt_with_entries(&[]);

    let generator = generator_with(SecurityConfig {
        max_input_size: 16,
        ..SecurityConfig::default()
    });
    let result = generator.merge(&template, &mapping());

    assert!(matches!(
        result,
        Err(OdtFillError::Extraction(ExtractionError::SecurityViolation(_)))
    ));
}

/// パストラバーサル攻撃のテスト
#[test]
fn test_path_traversal_entry_rejected() {
    for name in ["../../evil.xml", "Pictures/../../evil.xml", "/etc/passwd"] {
        let template = odt_with_entries(&[(name, &b"evil"[..])]);

        let result = extract(&template);
        assert!(
            matches!(result, Err(ExtractionError::SecurityViolation(_))),
            "entry '{}' should be rejected",
            name
        );
    }
}

#[test]
fn test_backslash_entry_rejected_on_rebuild() {
    let template = odt_with_entries(&[("Pictures\\logo.png", &b"png"[..])]);

    let result = odtfill::rebuild(&template, "<text:p>Acme</text:p>");
    assert!(matches!(result, Err(RebuildError::SecurityViolation(_))));
}

/// 外部実体参照は展開されない
#[test]
fn test_external_entity_is_not_expanded() {
    let markup = concat!(
        r#"<?xml version="1.0"?>"#,
        r#"<!DOCTYPE office:document-content [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>"#,
        r#"<office:document-content><text:p>&xxe; &lt;Cliente&gt;</text:p></office:document-content>"#
    );

    // 検査は未知の実体をエラーとして扱う
    assert!(matches!(inspect(markup), Err(OdtFillError::Markup(_))));

    // 置換は実体参照に触れず、そのまま残す
    let (text, count) = odtfill::substitute(markup, &mapping());
    assert_eq!(count, 1);
    assert!(text.contains("&xxe; Acme"));
}

#[test]
fn test_zero_limits_are_rejected_at_build() {
    let result = ProposalGeneratorBuilder::new()
        .with_security_config(SecurityConfig {
            max_entry_count: 0,
            ..SecurityConfig::default()
        })
        .build();

    assert!(matches!(result, Err(OdtFillError::Config(_))));
}

#[test]
fn test_default_limits_accept_regular_template() {
    let template = odt_with_entries(&[("styles.xml", &b"<office:document-styles/>"[..])]);

    let merged = generator_with(SecurityConfig::new())
        .merge(&template, &mapping())
        .unwrap();
    assert_eq!(merged.replacements, 1);
}
