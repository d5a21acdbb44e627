//! Two-pass Regex Substitutor
//!
//! 正規表現ベースの`Substitutor`実装。
//!
//! 1. パス1（フィールドタグ）: `text:database-display`要素を1回の走査で検出し、
//!    列名がマッピングに含まれるものを正規属性付きのタグとして再生成する。
//! 2. パス2（リテラル）: すべてのトークンを1つの選択パターンにまとめ、
//!    パス1で生成した範囲を除いて1回の走査で置換する。
//!
//! どちらのパスも置換後のテキストを再走査しないため、置換値に別のトークンが
//! 含まれていても二重に置換されることはありません。

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, partial_escape, unescape};
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use super::{FieldTagSchema, SubstitutionMapping, SubstitutionOutcome, Substitutor};
use crate::api::ValueEscaping;

/// フィールドタグ要素（属性の順序・追加属性を問わない）
static FIELD_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<text:database-display(\s[^>]*)?>([^<]*)</text:database-display>")
        .expect("field tag pattern is valid")
});

/// 属性列中の`text:column-name`
static COLUMN_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)text:column-name\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("column-name pattern is valid")
});

/// 動的に構築する選択パターンのサイズ上限
const LITERAL_PATTERN_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// 正規表現による2パス置換
///
/// # 使用例
///
/// ```rust
/// use odtfill::{FieldTagSchema, RegexSubstitutor, SubstitutionMapping, Substitutor, ValueEscaping};
///
/// let substitutor = RegexSubstitutor::new(FieldTagSchema::default(), ValueEscaping::Xml);
/// let mut mapping = SubstitutionMapping::new();
/// mapping.insert_field("Cliente", "Silva & Filhos");
///
/// let outcome = substitutor.substitute("<text:p>&lt;Cliente&gt;</text:p>", &mapping);
/// assert_eq!(outcome.text, "<text:p>Silva &amp; Filhos</text:p>");
/// assert_eq!(outcome.count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegexSubstitutor {
    schema: FieldTagSchema,
    escaping: ValueEscaping,
}

impl RegexSubstitutor {
    pub fn new(schema: FieldTagSchema, escaping: ValueEscaping) -> Self {
        Self { schema, escaping }
    }

    /// 挿入する値をエスケープ方式に従って変換
    fn prepare_value<'a>(&self, value: &'a str) -> Cow<'a, str> {
        match self.escaping {
            ValueEscaping::Xml => partial_escape(value),
            ValueEscaping::Verbatim => Cow::Borrowed(value),
        }
    }

    /// 正規属性付きのフィールドタグを生成
    fn canonical_tag(&self, column: &str, value: &str) -> String {
        format!(
            r#"<text:database-display text:column-name="{}" text:table-name="{}" text:table-type="{}" text:database-name="{}">{}</text:database-display>"#,
            escape(column),
            escape(self.schema.table_name.as_str()),
            escape(self.schema.table_type.as_str()),
            escape(self.schema.database_name.as_str()),
            value
        )
    }

    /// パス1: フィールドタグの再生成
    ///
    /// # 戻り値
    ///
    /// `(置換後テキスト, 生成したタグのバイト範囲, 置換件数)`
    fn replace_field_tags(
        &self,
        markup: &str,
        mapping: &SubstitutionMapping,
    ) -> (String, Vec<(usize, usize)>, usize) {
        if mapping.iter().all(|e| e.field.is_none()) {
            return (markup.to_string(), Vec::new(), 0);
        }

        let mut out = String::with_capacity(markup.len());
        let mut generated = Vec::new();
        let mut last = 0;

        for caps in FIELD_TAG.captures_iter(markup) {
            let Some(whole) = caps.get(0) else { continue };
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            // 自己終了タグの後ろにある本文は、このタグの内容ではない
            if attrs.trim_end().ends_with('/') {
                continue;
            }
            let Some(column) = column_name(attrs) else {
                continue;
            };
            let Some(entry) = mapping.get_field(&column) else {
                continue;
            };

            out.push_str(&markup[last..whole.start()]);
            let start = out.len();
            out.push_str(&self.canonical_tag(&column, &self.prepare_value(&entry.value)));
            generated.push((start, out.len()));
            last = whole.end();
        }
        out.push_str(&markup[last..]);

        let count = generated.len();
        (out, generated, count)
    }

    /// パス2: リテラルトークンの置換
    ///
    /// `skip`で指定されたバイト範囲（パス1の生成結果）は走査しません。
    fn replace_literals(
        &self,
        text: &str,
        skip: &[(usize, usize)],
        mapping: &SubstitutionMapping,
    ) -> (String, usize) {
        let needles = self.literal_needles(mapping);
        if needles.is_empty() {
            return (text.to_string(), 0);
        }
        let matcher = LiteralMatcher::new(&needles);

        let mut out = String::with_capacity(text.len());
        let mut count = 0;
        let mut cursor = 0;
        let boundaries = skip
            .iter()
            .copied()
            .chain(std::iter::once((text.len(), text.len())));
        for (start, end) in boundaries {
            count += matcher.replace_into(&text[cursor..start], &mut out);
            out.push_str(&text[start..end]);
            cursor = end;
        }

        (out, count)
    }

    /// 検索対象の文字列と置換値の組を構築
    ///
    /// 各トークンについて、そのままの形とXMLエスケープされた形
    /// （`<Cliente>` → `&lt;Cliente&gt;`）の両方を登録します。
    /// 長い文字列を優先するため、長さの降順に並べます。
    fn literal_needles<'m>(&self, mapping: &'m SubstitutionMapping) -> Vec<(String, Cow<'m, str>)> {
        let mut needles: Vec<(String, Cow<'m, str>)> = Vec::new();
        for entry in mapping.iter().filter(|e| !e.token.is_empty()) {
            let value = self.prepare_value(&entry.value);
            let escaped = partial_escape(&entry.token);
            if escaped != entry.token.as_str() {
                let escaped = escaped.into_owned();
                if !needles.iter().any(|(n, _)| *n == escaped) {
                    needles.push((escaped, value.clone()));
                }
            }
            if !needles.iter().any(|(n, _)| *n == entry.token) {
                needles.push((entry.token.clone(), value));
            }
        }
        needles.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        needles
    }
}

impl Substitutor for RegexSubstitutor {
    fn substitute(&self, markup: &str, mapping: &SubstitutionMapping) -> SubstitutionOutcome {
        let (after_fields, generated, field_tag_replacements) =
            self.replace_field_tags(markup, mapping);
        let (text, literal_replacements) =
            self.replace_literals(&after_fields, &generated, mapping);

        debug!(
            field_tag_replacements,
            literal_replacements,
            tokens = mapping.len(),
            "substitution complete"
        );

        SubstitutionOutcome {
            text,
            field_tag_replacements,
            literal_replacements,
        }
    }
}

/// 属性列から列名を取り出す（XMLエスケープを解除して返す）
fn column_name(attrs: &str) -> Option<String> {
    let caps = COLUMN_NAME.captures(attrs)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(
        unescape(raw)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| raw.to_string()),
    )
}

/// リテラルトークンの検索器
enum LiteralMatcher<'n, 'm> {
    /// すべてのトークンをまとめた選択パターン
    Pattern {
        regex: Regex,
        values: HashMap<&'n str, &'n str>,
    },
    /// パターンがサイズ上限を超えた場合の逐次走査
    Scan(&'n [(String, Cow<'m, str>)]),
}

impl<'n, 'm> LiteralMatcher<'n, 'm> {
    fn new(needles: &'n [(String, Cow<'m, str>)]) -> Self {
        let pattern = needles
            .iter()
            .map(|(needle, _)| regex::escape(needle))
            .collect::<Vec<_>>()
            .join("|");

        match RegexBuilder::new(&pattern)
            .size_limit(LITERAL_PATTERN_SIZE_LIMIT)
            .build()
        {
            Ok(regex) => LiteralMatcher::Pattern {
                regex,
                values: needles
                    .iter()
                    .map(|(n, v)| (n.as_str(), v.as_ref()))
                    .collect(),
            },
            Err(e) => {
                warn!(error = %e, needles = needles.len(), "literal pattern too large, scanning sequentially");
                LiteralMatcher::Scan(needles)
            }
        }
    }

    /// `segment`を置換しながら`out`に書き出し、置換件数を返す
    fn replace_into(&self, segment: &str, out: &mut String) -> usize {
        let mut count = 0;
        match self {
            LiteralMatcher::Pattern { regex, values } => {
                let mut last = 0;
                for m in regex.find_iter(segment) {
                    out.push_str(&segment[last..m.start()]);
                    match values.get(m.as_str()) {
                        Some(value) => {
                            out.push_str(value);
                            count += 1;
                        }
                        None => out.push_str(m.as_str()),
                    }
                    last = m.end();
                }
                out.push_str(&segment[last..]);
            }
            LiteralMatcher::Scan(needles) => {
                let mut rest = segment;
                'outer: while !rest.is_empty() {
                    for (needle, value) in needles.iter() {
                        if rest.starts_with(needle.as_str()) {
                            out.push_str(value);
                            rest = &rest[needle.len()..];
                            count += 1;
                            continue 'outer;
                        }
                    }
                    let mut chars = rest.chars();
                    if let Some(c) = chars.next() {
                        out.push(c);
                    }
                    rest = chars.as_str();
                }
            }
        }
        count
    }
}
