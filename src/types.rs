//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use chrono::NaiveDateTime;

/// セルの値を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// 数値（f64）
    Number(f64),

    /// 文字列
    String(String),

    /// 論理値
    Bool(bool),

    /// 日時（シリアル値はワークブックのエポックで解決済み）
    DateTime(NaiveDateTime),

    /// エラー値（例: #DIV/0!）
    Error(String),

    /// 空セル
    Empty,
}

impl CellValue {
    /// 値が空かどうかを判定
    ///
    /// 空白のみの文字列も空として扱います。
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 値を文字列として取得（書式適用前）
    ///
    /// 整数値の数値は小数点なしで表します（`1234.0` → `"1234"`）。
    pub fn as_raw_string(&self) -> String {
        match self {
            CellValue::Number(n) => format_plain_number(*n),
            CellValue::String(s) => s.clone(),
            CellValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            CellValue::DateTime(dt) => dt.format("%d/%m/%Y").to_string(),
            CellValue::Error(e) => e.clone(),
            CellValue::Empty => String::new(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

fn format_plain_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// スプレッドシートの1データ行
///
/// 列はヘッダー行の順序を保持します。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// スプレッドシート上の行番号（1始まり、ヘッダー行の次が最初のデータ行）
    pub line: usize,
    /// `(列名, 値)`の組（ヘッダー順）
    pub cells: Vec<(String, CellValue)>,
}

impl Row {
    /// 新しい行を生成
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: Vec::new(),
        }
    }

    /// 列を追加（ビルダー形式）
    pub fn with_cell(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.cells.push((column.into(), value.into()));
        self
    }

    /// 列名で値を取得
    ///
    /// 列名の前後の空白は無視して比較します。
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        let column = column.trim();
        self.cells
            .iter()
            .find(|(name, _)| name.trim() == column)
            .map(|(_, value)| value)
    }

    /// 列名の一覧
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }
}
