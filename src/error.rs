//! Error Types Module
//!
//! パイプラインの各ステージ（抽出・置換・再構築・レンダリング）で使用する
//! 構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use std::path::PathBuf;
use thiserror::Error;

/// ペイロード抽出時のエラー
///
/// コンテナ（ODTのZIPアーカイブ）が読み込めない、壊れている、
/// または`content.xml`を含まない場合に発生します。リトライ不可。
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// 入力がZIPアーカイブとして解釈できない
    #[error("Invalid container archive: {0}")]
    InvalidArchive(String),

    /// ペイロードエントリがアーカイブ内に存在しない
    #[error("Payload entry '{0}' not found in container")]
    MissingPayload(String),

    /// ペイロードがUTF-8として不正
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// 読み込み中のI/Oエラー
    #[error("IO error while extracting payload: {0}")]
    Io(#[from] std::io::Error),

    /// セキュリティ制限に違反した
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// コンテナ再構築時のエラー
///
/// 元アーカイブの読み込み、または新しいアーカイブの書き込み中に発生します。
#[derive(Error, Debug)]
pub enum RebuildError {
    /// ZIPアーカイブの読み書きエラー
    #[error("Container archive error: {0}")]
    Archive(String),

    /// 書き込み中のI/Oエラー
    #[error("IO error while rebuilding container: {0}")]
    Io(#[from] std::io::Error),

    /// セキュリティ制限に違反した
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// 外部レンダリングエンジン（LibreOffice）のエラー
///
/// すべてのバリアントは、外部プロセスが出力した診断メッセージを保持します。
#[derive(Error, Debug)]
pub enum RenderError {
    /// エンジンの実行ファイルが見つからない
    #[error("Rendering engine not found (searched: {searched:?})")]
    EngineNotFound {
        /// 探索したパスの一覧
        searched: Vec<PathBuf>,
    },

    /// 制限時間内にプロセスが終了しなかった
    #[error("Rendering engine timed out after {seconds}s: {stderr}")]
    Timeout {
        /// 制限時間（秒）
        seconds: u64,
        /// 標準エラー出力
        stderr: String,
    },

    /// ソース文書を読み込めなかった
    #[error("Rendering engine could not load the source document: {stderr}")]
    SourceNotLoaded {
        /// 標準エラー出力
        stderr: String,
    },

    /// 共有ライブラリが不足している
    #[error("Rendering engine is missing shared libraries: {stderr}")]
    MissingSharedLibraries {
        /// 標準エラー出力
        stderr: String,
    },

    /// 非ゼロの終了コード
    #[error("Rendering engine failed (exit code {code:?}): {stderr}")]
    Failed {
        /// 終了コード（シグナル終了の場合はNone）
        code: Option<i32>,
        /// 標準エラー出力
        stderr: String,
    },

    /// プロセスは成功したが出力ファイルが生成されなかった
    #[error("Rendering engine produced no output in '{}': {stdout}", dir.display())]
    NoOutput {
        /// 出力先ディレクトリ
        dir: PathBuf,
        /// 標準出力
        stdout: String,
    },

    /// ステージングファイルやプロセス起動のI/Oエラー
    #[error("IO error while rendering: {0}")]
    Io(#[from] std::io::Error),
}

/// スプレッドシート読み込み時のエラー
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// calamineによる解析エラー
    #[error("Failed to parse spreadsheet: {0}")]
    Parse(#[from] calamine::Error),

    /// ワークシートが存在しない
    #[error("Spreadsheet contains no worksheets")]
    NoSheets,

    /// ヘッダー行が存在しない
    #[error("Worksheet '{0}' has no header row")]
    EmptySheet(String),

    /// 行番号が範囲外
    #[error("Line {line} is out of range (valid: {first}..={last})")]
    RowOutOfRange {
        /// 指定された行番号（スプレッドシート上の表示行番号）
        line: usize,
        /// 先頭のデータ行番号
        first: usize,
        /// 末尾のデータ行番号
        last: usize,
    },

    /// 読み込み中のI/Oエラー
    #[error("IO error while reading spreadsheet: {0}")]
    Io(#[from] std::io::Error),

    /// セキュリティ制限に違反した
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// odtfillクレート全体で使用するエラー型
///
/// 各ステージのエラーを`#[from]`で集約します。
/// 置換件数0の警告（`SubstitutionAdvisory`）はエラーではなく、
/// ここには含まれません。
///
/// # 使用例
///
/// ```rust,no_run
/// use odtfill::{OdtFillError, ProposalGeneratorBuilder, SubstitutionMapping};
///
/// fn fill(template: &[u8]) -> Result<Vec<u8>, OdtFillError> {
///     let generator = ProposalGeneratorBuilder::new().build()?;
///     let mut mapping = SubstitutionMapping::new();
///     mapping.insert_field("Cliente", "Acme Corp");
///     Ok(generator.merge(template, &mapping)?.document)
/// }
/// ```
#[derive(Error, Debug)]
pub enum OdtFillError {
    /// ペイロード抽出エラー
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// コンテナ再構築エラー
    #[error(transparent)]
    Rebuild(#[from] RebuildError),

    /// レンダリングエラー
    #[error(transparent)]
    Render(#[from] RenderError),

    /// スプレッドシートエラー
    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    /// マークアップの解析エラー（テンプレート検査時）
    #[error("Failed to read template markup: {0}")]
    Markup(#[from] quick_xml::Error),

    /// I/O操作中に発生したエラー
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 設定の検証に失敗したエラー
    ///
    /// `ProposalGeneratorBuilder::build()`時に設定を検証し、無効な設定が
    /// 検出された場合に発生します。
    #[error("Configuration error: {0}")]
    Config(String),

    /// ワークフローの前提条件を満たしていない
    #[error("Workflow error: {0}")]
    Workflow(String),
}
