//! Payload Extractor
//!
//! コンテナを開き、`content.xml`をUTF-8テキストとして取り出します。

use std::io::{Cursor, Read};
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use super::CONTENT_XML_PATH;
use crate::error::ExtractionError;
use crate::security::SecurityConfig;

/// コンテナからペイロード（`content.xml`）を抽出する
///
/// デフォルトのセキュリティ設定を使用します。
///
/// # 引数
///
/// * `container` - ODTファイルのバイト列
///
/// # 戻り値
///
/// * `Ok(String)` - ペイロードのテキスト
/// * `Err(ExtractionError)` - アーカイブが不正、ペイロードが存在しない、
///   またはUTF-8として解釈できない場合
///
/// # 使用例
///
/// ```rust,no_run
/// let template = std::fs::read("proposta.odt")?;
/// let markup = odtfill::extract(&template)?;
/// assert!(markup.contains("office:document-content"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn extract(container: &[u8]) -> Result<String, ExtractionError> {
    extract_with(container, &SecurityConfig::default())
}

pub(crate) fn extract_with(
    container: &[u8],
    security: &SecurityConfig,
) -> Result<String, ExtractionError> {
    security
        .check_input_size(container.len())
        .map_err(ExtractionError::SecurityViolation)?;

    let mut archive = ZipArchive::new(Cursor::new(container))
        .map_err(|e| ExtractionError::InvalidArchive(e.to_string()))?;

    security
        .check_archive(&mut archive)
        .map_err(ExtractionError::SecurityViolation)?;

    let entry_count = archive.len();
    let mut entry = match archive.by_name(CONTENT_XML_PATH) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(ExtractionError::MissingPayload(CONTENT_XML_PATH.to_string()))
        }
        Err(ZipError::Io(e)) => return Err(ExtractionError::Io(e)),
        Err(e) => return Err(ExtractionError::InvalidArchive(e.to_string())),
    };

    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    let markup = String::from_utf8(bytes)?;

    debug!(
        entries = entry_count,
        payload_bytes = markup.len(),
        "extracted payload"
    );

    Ok(markup)
}
