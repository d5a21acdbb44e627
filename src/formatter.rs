//! Value Formatter Module
//!
//! スプレッドシートの値を、テンプレートに挿入する表示文字列に整形するモジュール。
//!
//! 列ごとの整形ルールは`FieldSchema`で指定します。
//!
//! - 通貨: `R$ 1.234,56`（千の位区切りは`.`、小数点は`,`）
//! - 日付: `dd/mm/YYYY`（空の場合は当日）
//! - その他: 文字列化のみ

use std::collections::HashMap;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};

use crate::api::FieldKind;
use crate::substitute::SubstitutionMapping;
use crate::types::{CellValue, Row};

/// 出力ファイル名を指定する列
pub const FILE_NAME_COLUMN: &str = "NOME DO ARQUIVO";

/// 数値に変換できない通貨値の表示
const ZERO_AMOUNT: &str = "R$ 0,00";

/// 1900年システムのエポック（1899-12-30）
///
/// Excelの1900年うるう年バグにより、シリアル値61以降はこの起算日で正しい日付になります。
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// シリアル値として受け付ける上限（9999-12-31）
const MAX_SERIAL: f64 = 2_958_465.0;

/// 列と整形ルールの組
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// 列名（プレースホルダー`<列名>`と一致）
    pub column: String,
    /// 整形ルール
    pub kind: FieldKind,
}

/// マッピングに含める列と、その整形ルールの一覧
///
/// 列の順序は保持されます。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// 空のスキーマを生成
    pub fn new() -> Self {
        Self::default()
    }

    /// 見積書テンプレート用の標準スキーマ
    ///
    /// 15列を含み、`Valor Rompedor`と`Valor Kit`は通貨、`Data`は日付として整形します。
    pub fn proposal() -> Self {
        const TEXT_COLUMNS_BEFORE: [&str; 10] = [
            "Cliente",
            "Cidade",
            "Estado",
            "Número",
            "Nome",
            "Telefone",
            "Email",
            "Modelo",
            "TIPO DE MÁQUINA",
            "MODELO DE MÁQUINA",
        ];

        let mut schema = Self::new();
        for column in TEXT_COLUMNS_BEFORE {
            schema = schema.with_field(column, FieldKind::Text);
        }
        schema
            .with_field("Valor Rompedor", FieldKind::Currency)
            .with_field("Valor Kit", FieldKind::Currency)
            .with_field("Condição de pagamento", FieldKind::Text)
            .with_field("FRETE", FieldKind::Text)
            .with_field("Data", FieldKind::Date)
    }

    /// 列を追加する
    ///
    /// 既に同じ列がある場合は、整形ルールだけを置き換えます（順序は変わりません）。
    pub fn with_field(mut self, column: impl Into<String>, kind: FieldKind) -> Self {
        let column = column.into();
        match self.fields.iter_mut().find(|spec| spec.column == column) {
            Some(spec) => spec.kind = kind,
            None => self.fields.push(FieldSpec { column, kind }),
        }
        self
    }

    /// スキーマにない列を`Text`として追加する
    ///
    /// スプレッドシートのヘッダーを渡すと、追加の列もマッピングに含められます。
    /// 出力ファイル名の列（`NOME DO ARQUIVO`）は追加しません。
    pub fn extended_with<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        for column in columns {
            let column = column.trim();
            if column.is_empty() || column == FILE_NAME_COLUMN || self.kind_of(column).is_some() {
                continue;
            }
            self = self.with_field(column, FieldKind::Text);
        }
        self
    }

    /// 列の整形ルールを取得
    pub fn kind_of(&self, column: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|spec| spec.column == column)
            .map(|spec| spec.kind)
    }

    /// 列を順に返す
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// 値フォーマッター
///
/// 日付列が空の場合に使う「当日」を保持します。テストでは`with_today`で固定できます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueFormatter {
    today: NaiveDate,
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueFormatter {
    /// ローカル時刻の当日を基準にしたフォーマッターを生成
    pub fn new() -> Self {
        Self {
            today: Local::now().date_naive(),
        }
    }

    /// 当日を固定したフォーマッターを生成
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today }
    }

    /// 基準日
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// 値を整形ルールに従って文字列化する
    pub fn format(&self, value: &CellValue, kind: FieldKind) -> String {
        match kind {
            FieldKind::Currency => format_currency(value),
            FieldKind::Date => self.format_date(value),
            FieldKind::Text => value.as_raw_string(),
        }
    }

    /// 日付を`dd/mm/YYYY`形式で整形する
    ///
    /// # 変換規則
    ///
    /// - 空の値: 当日
    /// - 日時: そのまま整形
    /// - 数値: Excelのシリアル値（1900年システム）として解釈
    /// - 文字列: 日付として解釈できればその日付、できなければ元の文字列
    ///
    /// `07/03/2025`のような曖昧な文字列は日を先に読みます（2025年3月7日）。
    /// 月を先に読むことはありません。
    ///
    /// # 使用例
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use odtfill::{CellValue, ValueFormatter};
    ///
    /// let formatter = ValueFormatter::with_today(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    /// assert_eq!(formatter.format_date(&CellValue::Empty), "02/01/2025");
    /// assert_eq!(formatter.format_date(&CellValue::from("2025-03-07")), "07/03/2025");
    /// assert_eq!(formatter.format_date(&CellValue::from("07/03/2025")), "07/03/2025");
    /// assert_eq!(formatter.format_date(&CellValue::from("a combinar")), "a combinar");
    /// ```
    pub fn format_date(&self, value: &CellValue) -> String {
        let date = match value {
            v if v.is_empty() => Some(self.today),
            CellValue::DateTime(dt) => Some(dt.date()),
            CellValue::Number(serial) => serial_to_date(*serial),
            CellValue::String(s) => parse_date_text(s.trim()),
            CellValue::Bool(_) | CellValue::Error(_) | CellValue::Empty => None,
        };

        match date {
            Some(date) => date.format("%d/%m/%Y").to_string(),
            None => value.as_raw_string(),
        }
    }

    /// 1行分の置換マッピングを作成する
    ///
    /// スキーマの各列について、フィールドのエントリ（トークン`<列名>`）を追加します。
    /// 行に存在しない列は空の値として整形します（日付列なら当日、通貨列なら`R$ 0,00`）。
    pub fn build_mapping(&self, row: &Row, schema: &FieldSchema) -> SubstitutionMapping {
        let mut mapping = SubstitutionMapping::new();
        for spec in schema.fields() {
            let value = row.get(&spec.column).unwrap_or(&CellValue::Empty);
            mapping.insert_field(&spec.column, self.format(value, spec.kind));
        }
        mapping
    }

    /// 生成文書のファイル名（拡張子なし）
    ///
    /// `NOME DO ARQUIVO`列に値があればそれを使い、なければ
    /// `Proposta_{Cliente}_{YYYYMMDD}`を組み立てます。
    /// 空白は`_`、パス区切り文字は`-`に置き換えます。
    pub fn output_file_stem(&self, row: &Row) -> String {
        if let Some(name) = row.get(FILE_NAME_COLUMN).filter(|v| !v.is_empty()) {
            return name.as_raw_string().trim().replace(['/', '\\'], "-");
        }

        let client = row
            .get("Cliente")
            .filter(|v| !v.is_empty())
            .map(|v| v.as_raw_string())
            .unwrap_or_else(|| "Cliente".to_string());
        format!(
            "Proposta_{}_{}",
            client.trim().replace(' ', "_").replace(['/', '\\'], "-"),
            self.today.format("%Y%m%d")
        )
    }

    /// 複数行の生成文書のファイル名（拡張子なし、行と同じ順序）
    ///
    /// 同じ名前になる行が複数ある場合は、その全ての行の名前に`_l{行番号}`を付けて
    /// 互いに上書きしないようにします。大文字と小文字の違いだけの名前も重複として扱います。
    pub fn output_file_stems(&self, rows: &[Row]) -> Vec<String> {
        let stems: Vec<String> = rows.iter().map(|row| self.output_file_stem(row)).collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for stem in &stems {
            *counts.entry(stem.to_lowercase()).or_default() += 1;
        }

        rows.iter()
            .zip(stems)
            .map(|(row, stem)| {
                if counts.get(&stem.to_lowercase()).copied().unwrap_or(0) > 1 {
                    format!("{}_l{}", stem, row.line)
                } else {
                    stem
                }
            })
            .collect()
    }
}

/// 通貨値を`R$ 1.234,56`形式で整形する
///
/// 文字列はブラジル形式（`1.234,56`）として解釈します。`R$`の接頭辞は無視します。
/// 数値に変換できない値（空を含む）は`R$ 0,00`になります。
///
/// # 使用例
///
/// ```rust
/// use odtfill::{format_currency, CellValue};
///
/// assert_eq!(format_currency(&CellValue::Number(1234.5)), "R$ 1.234,50");
/// assert_eq!(format_currency(&CellValue::from("12.345,6")), "R$ 12.345,60");
/// assert_eq!(format_currency(&CellValue::from("consultar")), "R$ 0,00");
/// ```
pub fn format_currency(value: &CellValue) -> String {
    match parse_amount(value) {
        Some(amount) => format_brl(amount),
        None => ZERO_AMOUNT.to_string(),
    }
}

/// 金額を`R$ 1.234,56`形式で整形する
pub fn format_brl(amount: f64) -> String {
    if !amount.is_finite() {
        return ZERO_AMOUNT.to_string();
    }

    let cents = (amount.abs() * 100.0).round() as u128;
    let units = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("R$ {}{},{:02}", sign, grouped, fraction)
}

fn parse_amount(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) => Some(*n),
        CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        CellValue::String(s) => {
            let s = s.trim();
            let s = s.strip_prefix("R$").unwrap_or(s).trim();
            s.replace('.', "").replace(',', ".").parse::<f64>().ok()
        }
        CellValue::DateTime(_) | CellValue::Error(_) | CellValue::Empty => None,
    }
}

/// Excelのシリアル値（1900年システム）を日付に変換
pub(crate) fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(0.0..=MAX_SERIAL).contains(&serial) {
        return None;
    }
    let (y, m, d) = EXCEL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: [&str; 5] = [
        "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d",
    ];
    const DATETIME_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];

    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.date_naive())
        })
}
