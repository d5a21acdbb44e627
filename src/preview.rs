//! Preview Module
//!
//! 生成前の確認用に、置換マッピングを表やJSONとして出力するモジュール。

use std::io::Write;

use unicode_width::UnicodeWidthStr;

use crate::error::OdtFillError;
use crate::substitute::SubstitutionMapping;

/// 確認ステップで強調表示する列
pub const HIGHLIGHT_COLUMNS: [&str; 5] = ["Cliente", "Modelo", "Valor Rompedor", "Valor Kit", "Data"];

const FIELD_HEADER: &str = "Campo";
const VALUE_HEADER: &str = "Valor";

/// 強調表示する列だけを取り出したマッピング
///
/// `HIGHLIGHT_COLUMNS`の順序で、マッピングに存在する列のみを含みます。
pub fn highlights(mapping: &SubstitutionMapping) -> SubstitutionMapping {
    let mut selected = SubstitutionMapping::new();
    for column in HIGHLIGHT_COLUMNS {
        if let Some(entry) = mapping.get_field(column) {
            selected.insert_field(column, entry.value.clone());
        }
    }
    selected
}

/// マッピングを2列の表として出力
///
/// 列幅は表示幅（全角文字は2）で揃えます。フィールドはその列名、
/// リテラルのみのエントリはトークンを1列目に表示します。
///
/// # 使用例
///
/// ```rust
/// use odtfill::{preview, SubstitutionMapping};
///
/// let mut mapping = SubstitutionMapping::new();
/// mapping.insert_field("Cliente", "Acme");
///
/// let mut out = Vec::new();
/// preview::render_table(&mapping, &mut out).unwrap();
/// assert_eq!(
///     String::from_utf8(out).unwrap(),
///     "| Campo   | Valor |\n|---------|-------|\n| Cliente | Acme  |\n"
/// );
/// ```
pub fn render_table<W: Write>(
    mapping: &SubstitutionMapping,
    writer: &mut W,
) -> Result<(), OdtFillError> {
    let rows: Vec<(String, String)> = mapping
        .iter()
        .map(|entry| {
            let label = entry.field.as_deref().unwrap_or(&entry.token);
            (sanitize_cell(label), sanitize_cell(&entry.value))
        })
        .collect();

    // 最小幅は3文字（区切り行の最小幅）
    let label_width = rows
        .iter()
        .map(|(label, _)| label.width())
        .chain([FIELD_HEADER.width(), 3])
        .max()
        .unwrap_or(3);
    let value_width = rows
        .iter()
        .map(|(_, value)| value.width())
        .chain([VALUE_HEADER.width(), 3])
        .max()
        .unwrap_or(3);

    write_row(writer, FIELD_HEADER, label_width, VALUE_HEADER, value_width)?;
    writeln!(
        writer,
        "|{}|{}|",
        "-".repeat(label_width + 2),
        "-".repeat(value_width + 2)
    )?;
    for (label, value) in &rows {
        write_row(writer, label, label_width, value, value_width)?;
    }

    writer.flush()?;
    Ok(())
}

/// マッピングをJSON配列として出力
///
/// 各要素は`{"token": ..., "field": ..., "value": ...}`です。
pub fn render_json<W: Write>(
    mapping: &SubstitutionMapping,
    writer: &mut W,
) -> Result<(), OdtFillError> {
    let entries: Vec<_> = mapping.iter().collect();
    serde_json::to_writer_pretty(&mut *writer, &entries).map_err(|e| {
        OdtFillError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("JSON serialization error: {}", e),
        ))
    })?;
    writeln!(writer)?;
    Ok(())
}

fn write_row<W: Write>(
    writer: &mut W,
    label: &str,
    label_width: usize,
    value: &str,
    value_width: usize,
) -> Result<(), OdtFillError> {
    writeln!(
        writer,
        "| {}{} | {}{} |",
        label,
        " ".repeat(label_width.saturating_sub(label.width())),
        value,
        " ".repeat(value_width.saturating_sub(value.width()))
    )?;
    Ok(())
}

/// 改行と区切り文字を表のセルとして安全な形にする
fn sanitize_cell(s: &str) -> String {
    s.trim()
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace('|', "\\|")
}
