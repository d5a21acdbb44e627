//! Template Inspection Module
//!
//! ペイロードを読み取り専用で走査し、テンプレートに含まれるプレースホルダー
//! （フィールドタグの列名とリテラルトークン）を列挙するモジュール。
//! 置換前に、マッピングで埋まらないプレースホルダーを検出するために使用します。

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Serialize;

use crate::error::OdtFillError;
use crate::substitute::SubstitutionMapping;

const FIELD_TAG_NAME: &[u8] = b"text:database-display";
const COLUMN_NAME_ATTR: &[u8] = b"text:column-name";

/// 本文中の`<...>`形式のトークン（改行を含まない短いもの）
static LITERAL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^<>\r\n]{1,80}>").expect("literal token pattern is valid"));

/// テンプレートの検査結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateReport {
    /// フィールドタグが参照する列名（出現順、重複なし）
    pub field_columns: Vec<String>,
    /// 本文中のリテラルトークン（出現順、重複なし、エスケープ解除済み）
    pub literal_tokens: Vec<String>,
}

impl TemplateReport {
    /// マッピングで埋まらないプレースホルダー
    ///
    /// フィールドタグは`<列名>`の形で返します。
    pub fn uncovered(&self, mapping: &SubstitutionMapping) -> Vec<String> {
        let fields = self
            .field_columns
            .iter()
            .filter(|column| mapping.get_field(column).is_none())
            .map(|column| format!("<{}>", column));
        let literals = self
            .literal_tokens
            .iter()
            .filter(|token| mapping.get(token).is_none())
            .cloned();

        let mut uncovered: Vec<String> = Vec::new();
        for token in fields.chain(literals) {
            if !uncovered.contains(&token) {
                uncovered.push(token);
            }
        }
        uncovered
    }

    /// テンプレートに現れないマッピングのトークン
    pub fn unused<'m>(&self, mapping: &'m SubstitutionMapping) -> Vec<&'m str> {
        mapping
            .iter()
            .filter(|entry| {
                let as_field = entry
                    .field
                    .as_ref()
                    .is_some_and(|f| self.field_columns.contains(f));
                !as_field && !self.literal_tokens.contains(&entry.token)
            })
            .map(|entry| entry.token.as_str())
            .collect()
    }

    /// プレースホルダーが1つも見つからなかったか
    pub fn is_empty(&self) -> bool {
        self.field_columns.is_empty() && self.literal_tokens.is_empty()
    }
}

/// ペイロードを検査する
///
/// # 引数
///
/// * `markup` - `content.xml`のテキスト
///
/// # 戻り値
///
/// * `Ok(TemplateReport)` - 検査結果
/// * `Err(OdtFillError::Markup)` - マークアップが整形式でない場合
///
/// # 使用例
///
/// ```rust
/// let markup = r#"<text:p><text:database-display text:column-name="Cliente">&lt;Cliente&gt;</text:database-display> &lt;Data&gt;</text:p>"#;
/// let report = odtfill::inspect(markup).unwrap();
/// assert_eq!(report.field_columns, vec!["Cliente"]);
/// assert_eq!(report.literal_tokens, vec!["<Data>"]);
/// ```
pub fn inspect(markup: &str) -> Result<TemplateReport, OdtFillError> {
    let mut reader = Reader::from_str(markup);
    let mut report = TemplateReport::default();
    // フィールドタグ内の表示テキストはリテラルとして扱わない
    let mut field_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == FIELD_TAG_NAME => {
                field_depth += 1;
                if let Some(column) = column_attribute(&reader, &e)? {
                    push_unique(&mut report.field_columns, column);
                }
            }
            Event::Empty(e) if e.name().as_ref() == FIELD_TAG_NAME => {
                if let Some(column) = column_attribute(&reader, &e)? {
                    push_unique(&mut report.field_columns, column);
                }
            }
            Event::End(e) if e.name().as_ref() == FIELD_TAG_NAME => {
                field_depth = field_depth.saturating_sub(1);
            }
            Event::Text(t) if field_depth == 0 => {
                let text = t.unescape()?;
                for m in LITERAL_TOKEN.find_iter(&text) {
                    push_unique(&mut report.literal_tokens, m.as_str().to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(report)
}

fn column_attribute(
    reader: &Reader<&[u8]>,
    element: &quick_xml::events::BytesStart<'_>,
) -> Result<Option<String>, OdtFillError> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == COLUMN_NAME_ATTR {
            return Ok(Some(attr.decode_and_unescape_value(reader)?.into_owned()));
        }
    }
    Ok(None)
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}
