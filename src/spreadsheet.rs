//! Spreadsheet Module
//!
//! calamineを使用して、見積データのスプレッドシート（XLSX/XLS/ODS）を読み込むモジュール。
//!
//! 最初のワークシートの先頭行をヘッダーとし、以降の各行を`Row`として保持します。
//! 行はスプレッドシート上の表示行番号（ヘッダーの次の行が最初のデータ行）で指定できます。

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::{Cursor, Read};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::debug;

use crate::error::SpreadsheetError;
use crate::security::SecurityConfig;
use crate::types::{CellValue, Row};

/// 読み込んだワークシート
#[derive(Debug, Clone, PartialEq)]
pub struct Spreadsheet {
    sheet_name: String,
    headers: Vec<String>,
    rows: Vec<Row>,
    /// 最初のデータ行の表示行番号
    first_line: usize,
}

impl Spreadsheet {
    /// リーダーからスプレッドシートを読み込む
    ///
    /// # 引数
    ///
    /// * `reader` - スプレッドシートのバイト列を読み込むリーダー
    ///
    /// # 戻り値
    ///
    /// * `Ok(Spreadsheet)` - 最初のワークシートの読み込みに成功した場合
    /// * `Err(SpreadsheetError)` - 解析に失敗した場合、またはワークシートが空の場合
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use odtfill::Spreadsheet;
    /// use std::fs::File;
    ///
    /// let sheet = Spreadsheet::from_reader(File::open("propostas.xlsx")?)?;
    /// let row = sheet.row_at_line(2)?;
    /// println!("{:?}", row.get("Cliente"));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SpreadsheetError> {
        Self::from_reader_with(reader, &SecurityConfig::default())
    }

    /// ファイルパスからスプレッドシートを読み込む
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SpreadsheetError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub(crate) fn from_reader_with<R: Read>(
        reader: R,
        security: &SecurityConfig,
    ) -> Result<Self, SpreadsheetError> {
        // セキュリティ: 上限+1バイトまでしか読まない
        let mut buffer = Vec::new();
        reader
            .take(security.max_input_size.saturating_add(1))
            .read_to_end(&mut buffer)?;
        security
            .check_input_size(buffer.len())
            .map_err(SpreadsheetError::SecurityViolation)?;

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(buffer))?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(SpreadsheetError::NoSheets)?;
        let range = workbook.worksheet_range(&sheet_name)?;

        Self::from_range(sheet_name, &range)
    }

    fn from_range(sheet_name: String, range: &Range<Data>) -> Result<Self, SpreadsheetError> {
        let mut rows_iter = range.rows();
        let header_cells = rows_iter
            .next()
            .ok_or_else(|| SpreadsheetError::EmptySheet(sheet_name.clone()))?;

        let headers: Vec<String> = header_cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let name = cell.to_string().trim().to_string();
                if name.is_empty() {
                    format!("Unnamed: {}", idx)
                } else {
                    name
                }
            })
            .collect();

        // 範囲は最初の非空セルから始まるため、ヘッダーの表示行番号を補正する
        let header_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
        let first_line = header_line + 1;

        let rows: Vec<Row> = rows_iter
            .enumerate()
            .map(|(offset, cells)| Row {
                line: first_line + offset,
                cells: headers
                    .iter()
                    .zip(cells.iter())
                    .map(|(header, cell)| (header.clone(), convert_cell(cell)))
                    .collect(),
            })
            .collect();

        debug!(
            sheet = %sheet_name,
            columns = headers.len(),
            rows = rows.len(),
            "spreadsheet loaded"
        );

        Ok(Self {
            sheet_name,
            headers,
            rows,
            first_line,
        })
    }

    /// ワークシート名
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// ヘッダー行の列名（空の列名は`Unnamed: {列番号}`）
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// データ行
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 選択可能な表示行番号の範囲
    ///
    /// データ行がない場合は空の範囲になります。
    pub fn line_range(&self) -> RangeInclusive<usize> {
        self.first_line..=self.last_line()
    }

    fn last_line(&self) -> usize {
        (self.first_line + self.rows.len()).saturating_sub(1)
    }

    /// 表示行番号で行を取得する
    ///
    /// # 戻り値
    ///
    /// * `Ok(&Row)` - 行が存在する場合
    /// * `Err(SpreadsheetError::RowOutOfRange)` - 範囲外の場合
    pub fn row_at_line(&self, line: usize) -> Result<&Row, SpreadsheetError> {
        line.checked_sub(self.first_line)
            .and_then(|index| self.rows.get(index))
            .ok_or(SpreadsheetError::RowOutOfRange {
                line,
                first: self.first_line,
                last: self.last_line(),
            })
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => CellValue::DateTime(datetime),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
        Data::Empty => CellValue::Empty,
        other => CellValue::String(other.to_string()),
    }
}
