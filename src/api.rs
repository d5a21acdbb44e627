//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

use serde::Serialize;

/// 置換値をマークアップに挿入する際のエスケープ方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ValueEscaping {
    /// `&`、`<`、`>`をXML実体参照に変換して挿入（デフォルト）
    ///
    /// 例: `Silva & Filhos` → `Silva &amp; Filhos`
    #[default]
    Xml,

    /// 値をそのまま挿入
    ///
    /// 値自体がマークアップ断片である場合に使用します。
    /// 不正な値を渡すと、生成される文書のXMLが壊れる可能性があります。
    Verbatim,
}

/// レンダリング後の出力フォーマット
///
/// LibreOfficeの`--convert-to`に渡すフィルタ名と、出力ファイルの拡張子を決定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[non_exhaustive]
pub enum OutputFormat {
    /// PDF（デフォルト）
    #[default]
    Pdf,

    /// Microsoft Word（.docx）
    Docx,

    /// OpenDocument Text（.odt）
    ///
    /// 再構築済みのコンテナをそのまま出力します（外部エンジンは起動しません）。
    Odt,
}

impl OutputFormat {
    /// 出力ファイルの拡張子
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Docx => "docx",
            OutputFormat::Odt => "odt",
        }
    }

    /// MIMEタイプ
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Odt => "application/vnd.oasis.opendocument.text",
        }
    }

    /// 外部エンジンによる変換が必要かどうか
    pub fn requires_engine(&self) -> bool {
        !matches!(self, OutputFormat::Odt)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(OutputFormat::Pdf),
            "docx" => Ok(OutputFormat::Docx),
            "odt" => Ok(OutputFormat::Odt),
            other => Err(format!("unsupported output format: '{}'", other)),
        }
    }
}

/// 列の値の種類
///
/// 値フォーマッターが、列ごとにどの整形ルールを適用するかを決定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum FieldKind {
    /// 通貨（ブラジル・レアル形式）
    ///
    /// 例: `1234.56` → `R$ 1.234,56`
    Currency,

    /// 日付（`dd/mm/YYYY`形式、空の場合は当日）
    ///
    /// 例: `2025-03-07` → `07/03/2025`
    Date,

    /// その他（文字列化のみ）
    Text,
}
