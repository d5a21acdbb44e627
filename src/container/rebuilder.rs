//! Container Rebuilder
//!
//! 元のコンテナを読み取り専用で開き、`content.xml`のみを差し替えた
//! 新しいコンテナを生成します。その他のエントリは圧縮済みバイト列のまま
//! コピーされるため、元のエントリとバイト単位で一致します。

use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

use super::CONTENT_XML_PATH;
use crate::error::RebuildError;
use crate::security::SecurityConfig;

/// ペイロードを差し替えたコンテナを生成する
///
/// デフォルトのセキュリティ設定を使用します。
///
/// # 引数
///
/// * `original` - 元のODTファイルのバイト列（変更されません）
/// * `markup` - 新しいペイロードのテキスト
///
/// # 戻り値
///
/// * `Ok(Vec<u8>)` - 新しいコンテナのバイト列
/// * `Err(RebuildError)` - 読み込みまたは書き込みでエラーが発生した場合
///
/// # 保証
///
/// - エントリの集合と順序は元のコンテナと同一
/// - `content.xml`以外のエントリは圧縮方式・タイムスタンプ・CRCを含めて同一
/// - `content.xml`は元の圧縮方式とタイムスタンプを引き継ぐ
pub fn rebuild(original: &[u8], markup: &str) -> Result<Vec<u8>, RebuildError> {
    rebuild_with(original, markup, &SecurityConfig::default())
}

pub(crate) fn rebuild_with(
    original: &[u8],
    markup: &str,
    security: &SecurityConfig,
) -> Result<Vec<u8>, RebuildError> {
    security
        .check_input_size(original.len())
        .map_err(RebuildError::SecurityViolation)?;

    let mut archive = ZipArchive::new(Cursor::new(original)).map_err(archive_error)?;

    security
        .check_archive(&mut archive)
        .map_err(RebuildError::SecurityViolation)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(
        original.len() + markup.len(),
    )));
    let mut payload_written = false;

    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(archive_error)?;

        if entry.name() == CONTENT_XML_PATH {
            let mut options = FileOptions::default()
                .compression_method(payload_compression(entry.compression()))
                .last_modified_time(entry.last_modified());
            if let Some(mode) = entry.unix_mode() {
                options = options.unix_permissions(mode);
            }
            drop(entry);

            writer
                .start_file(CONTENT_XML_PATH, options)
                .map_err(archive_error)?;
            writer.write_all(markup.as_bytes())?;
            payload_written = true;
        } else {
            writer.raw_copy_file(entry).map_err(archive_error)?;
        }
    }

    // 再構築は置換のみを行い、ペイロードを新規追加しない
    if !payload_written {
        return Err(RebuildError::Archive(format!(
            "original container has no '{}' entry",
            CONTENT_XML_PATH
        )));
    }

    let bytes = writer.finish().map_err(archive_error)?.into_inner();

    debug!(
        entries = archive.len(),
        original_bytes = original.len(),
        rebuilt_bytes = bytes.len(),
        "rebuilt container"
    );

    Ok(bytes)
}

/// ペイロードの圧縮方式を決定する
///
/// deflate以外の方式は書き込みに対応していないため、deflateで再圧縮します。
fn payload_compression(original: CompressionMethod) -> CompressionMethod {
    match original {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

fn archive_error(e: zip::result::ZipError) -> RebuildError {
    match e {
        zip::result::ZipError::Io(io) => RebuildError::Io(io),
        other => RebuildError::Archive(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::extract;
    use crate::container::test_support::build_odt;
    use std::io::Read;

    fn raw_entries(bytes: &[u8]) -> Vec<(String, CompressionMethod, u32, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (
                    file.name().to_string(),
                    file.compression(),
                    file.crc32(),
                    data,
                )
            })
            .collect()
    }

    #[test]
    fn test_rebuild_replaces_only_payload() {
        let original = build_odt("<doc>OLD</doc>");
        let rebuilt = rebuild(&original, "<doc>NEW</doc>").unwrap();

        let before = raw_entries(&original);
        let after = raw_entries(&rebuilt);
        assert_eq!(before.len(), after.len());

        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.0, a.0, "entry order must be preserved");
            assert_eq!(b.1, a.1, "compression method must be preserved");
            if b.0 == CONTENT_XML_PATH {
                assert_eq!(a.3, b"<doc>NEW</doc>");
            } else {
                assert_eq!(b.2, a.2);
                assert_eq!(b.3, a.3);
            }
        }
    }

    #[test]
    fn test_rebuild_keeps_mimetype_first_and_stored() {
        let original = build_odt("<doc/>");
        let rebuilt = rebuild(&original, "<doc>x</doc>").unwrap();
        let entries = raw_entries(&rebuilt);
        assert_eq!(entries[0].0, "mimetype");
        assert_eq!(entries[0].1, CompressionMethod::Stored);
    }

    #[test]
    fn test_rebuild_then_extract_is_identity() {
        let original = build_odt("<doc/>");
        let text = "<doc>Condição: à vista — R$ 1.234,56</doc>";
        let rebuilt = rebuild(&original, text).unwrap();
        assert_eq!(extract(&rebuilt).unwrap(), text);
    }

    #[test]
    fn test_rebuild_does_not_mutate_original() {
        let original = build_odt("<doc>OLD</doc>");
        let snapshot = original.clone();
        let _ = rebuild(&original, "<doc>NEW</doc>").unwrap();
        assert_eq!(original, snapshot);
    }

    #[test]
    fn test_rebuild_rejects_invalid_archive() {
        assert!(matches!(
            rebuild(b"PK\x03\x04 truncated", "<doc/>"),
            Err(RebuildError::Archive(_)) | Err(RebuildError::Io(_))
        ));
    }

    #[test]
    fn test_rebuild_requires_payload_entry() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("styles.xml", FileOptions::default()).unwrap();
        zip.write_all(b"<s/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        match rebuild(&bytes, "<doc/>") {
            Err(RebuildError::Archive(msg)) => assert!(msg.contains("content.xml")),
            other => panic!("Expected Archive error, got {:?}", other),
        }
    }
}
