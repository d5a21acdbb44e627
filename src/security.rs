//! Security Module
//!
//! コンテナ（ZIPアーカイブ）を開く際のセキュリティ対策を実装するモジュール。
//! ZIP bomb攻撃、パストラバーサル攻撃への対策を提供します。

use std::io::{Read, Seek};
use zip::ZipArchive;

/// セキュリティ設定
///
/// コンテナ処理時のセキュリティ制限を定義します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// 展開後の合計最大サイズ（バイト）
    /// デフォルト: 1GB (1_073_741_824 bytes)
    pub max_decompressed_size: u64,
    /// ZIPアーカイブ内の最大エントリ数
    /// デフォルト: 10000
    pub max_entry_count: usize,
    /// 単一エントリの最大サイズ（バイト）
    /// デフォルト: 100MB (104_857_600 bytes)
    pub max_entry_size: u64,
    /// 入力コンテナの最大サイズ（バイト）
    /// デフォルト: 512MB (536_870_912 bytes)
    pub max_input_size: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: 1_073_741_824, // 1GB
            max_entry_count: 10_000,
            max_entry_size: 104_857_600, // 100MB
            max_input_size: 536_870_912, // 512MB
        }
    }
}

impl SecurityConfig {
    /// デフォルトのセキュリティ設定を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定値の妥当性を検証
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_entry_count == 0 {
            return Err("max_entry_count must be at least 1".to_string());
        }
        if self.max_entry_size == 0 || self.max_decompressed_size == 0 || self.max_input_size == 0
        {
            return Err("size limits must be positive".to_string());
        }
        Ok(())
    }

    /// 入力サイズを検証
    pub(crate) fn check_input_size(&self, len: usize) -> Result<(), String> {
        if len as u64 > self.max_input_size {
            return Err(format!(
                "Input container size exceeds maximum: {} bytes (max: {} bytes)",
                len, self.max_input_size
            ));
        }
        Ok(())
    }

    /// アーカイブ全体を検証（エントリ数、パス、サイズ）
    ///
    /// # 戻り値
    ///
    /// * `Ok(())` - すべての制限を満たす場合
    /// * `Err(String)` - 違反内容を説明するメッセージ
    pub(crate) fn check_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<(), String> {
        if archive.len() > self.max_entry_count {
            return Err(format!(
                "ZIP archive contains too many entries: {} (max: {})",
                archive.len(),
                self.max_entry_count
            ));
        }

        let mut total_decompressed_size = 0u64;
        for i in 0..archive.len() {
            let file = archive.by_index(i).map_err(|e| e.to_string())?;

            let name = file.name();
            validate_zip_path(name).map_err(|e| format!("Invalid ZIP path: {}", e))?;

            let size = file.size();
            if size > self.max_entry_size {
                return Err(format!(
                    "Entry '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                    name, size, self.max_entry_size
                ));
            }

            total_decompressed_size = total_decompressed_size
                .checked_add(size)
                .ok_or_else(|| "Total decompressed size calculation overflow".to_string())?;

            if total_decompressed_size > self.max_decompressed_size {
                return Err(format!(
                    "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                    total_decompressed_size, self.max_decompressed_size
                ));
            }
        }

        Ok(())
    }
}

/// エントリパスの検証
///
/// パストラバーサル攻撃を防ぐため、アーカイブ内のパスを検証します。
///
/// # 戻り値
///
/// * `Ok(())` - パスが安全な場合
/// * `Err(String)` - パスが危険な場合（`..`、絶対パス、`\`を含む）
pub(crate) fn validate_zip_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Empty path is not allowed".to_string());
    }

    if path.starts_with('/') || path.starts_with("C:\\") || path.starts_with("c:\\") {
        return Err(format!("Absolute path is not allowed: {}", path));
    }

    if path.split('/').any(|segment| segment == "..") {
        return Err(format!("Path traversal detected: {}", path));
    }

    if path.contains('\\') {
        return Err(format!("Backslash in path is not allowed: {}", path));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::{FileOptions, ZipWriter};

    fn archive_with(names: &[&str]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for name in names {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(b"x").unwrap();
        }
        let cursor = zip.finish().unwrap();
        ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn test_validate_zip_path_valid() {
        assert!(validate_zip_path("content.xml").is_ok());
        assert!(validate_zip_path("META-INF/manifest.xml").is_ok());
        assert!(validate_zip_path("Configurations2/accelerator/").is_ok());
        assert!(validate_zip_path("Pictures/1000000000000.png").is_ok());
    }

    #[test]
    fn test_validate_zip_path_empty() {
        assert!(validate_zip_path("").is_err());
    }

    #[test]
    fn test_validate_zip_path_absolute() {
        assert!(validate_zip_path("/etc/passwd").is_err());
        assert!(validate_zip_path("C:\\Windows\\system32").is_err());
        assert!(validate_zip_path("c:\\content.xml").is_err());
    }

    #[test]
    fn test_validate_zip_path_traversal() {
        assert!(validate_zip_path("../etc/passwd").is_err());
        assert!(validate_zip_path("Pictures/../../etc/passwd").is_err());
        assert!(validate_zip_path("..").is_err());
    }

    #[test]
    fn test_validate_zip_path_backslash() {
        assert!(validate_zip_path("META-INF\\manifest.xml").is_err());
    }

    #[test]
    fn test_check_archive_entry_count() {
        let mut archive = archive_with(&["a.xml", "b.xml", "c.xml"]);
        let config = SecurityConfig {
            max_entry_count: 2,
            ..SecurityConfig::default()
        };
        let err = config.check_archive(&mut archive).unwrap_err();
        assert!(err.contains("too many entries"));

        assert!(SecurityConfig::default().check_archive(&mut archive).is_ok());
    }

    #[test]
    fn test_check_archive_total_size() {
        let mut archive = archive_with(&["a.xml", "b.xml"]);
        let config = SecurityConfig {
            max_decompressed_size: 1,
            ..SecurityConfig::default()
        };
        let err = config.check_archive(&mut archive).unwrap_err();
        assert!(err.contains("decompressed size"));
    }

    #[test]
    fn test_check_input_size() {
        let config = SecurityConfig {
            max_input_size: 10,
            ..SecurityConfig::default()
        };
        assert!(config.check_input_size(10).is_ok());
        assert!(config.check_input_size(11).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = SecurityConfig {
            max_entry_count: 0,
            ..SecurityConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SecurityConfig::new().validate().is_ok());
    }
}
