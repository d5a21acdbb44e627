//! Placeholder Substitution Module
//!
//! マークアップ中のプレースホルダーを置換するモジュール。
//!
//! プレースホルダーには2種類の表現があります。
//!
//! - フィールドタグ: `<text:database-display text:column-name="Cliente" ...>表示値</text:database-display>`
//! - リテラルトークン: 本文中の`<Cliente>`（ペイロード上では`&lt;Cliente&gt;`）
//!
//! 置換処理は`Substitutor`トレイトの背後に隔離されており、呼び出し側を変えずに
//! 実装（正規表現ベース、マークアップツリー編集など）を差し替えられます。

mod mapping;
mod regex_pass;

use std::fmt;

pub use mapping::{SubstitutionEntry, SubstitutionMapping};
pub use regex_pass::RegexSubstitutor;

/// プレースホルダー置換のインターフェース
///
/// 実装は失敗してはなりません。一致しないトークンは置換件数0として扱います。
pub trait Substitutor {
    /// マークアップ中のプレースホルダーをマッピングの値で置換する
    fn substitute(&self, markup: &str, mapping: &SubstitutionMapping) -> SubstitutionOutcome;
}

/// 置換結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionOutcome {
    /// 置換後のマークアップ
    pub text: String,
    /// フィールドタグの置換件数（パス1）
    pub field_tag_replacements: usize,
    /// リテラルトークンの置換件数（パス2）
    pub literal_replacements: usize,
}

impl SubstitutionOutcome {
    /// 両パスの合計置換件数
    pub fn count(&self) -> usize {
        self.field_tag_replacements + self.literal_replacements
    }

    /// 置換件数が0の場合の警告
    ///
    /// エラーではなく、処理は継続されます。
    pub fn advisory(&self, mapping: &SubstitutionMapping) -> Option<SubstitutionAdvisory> {
        (self.count() == 0).then(|| SubstitutionAdvisory {
            tokens_searched: mapping.len(),
        })
    }
}

/// 置換件数0の警告
///
/// テンプレートにマッピングのプレースホルダーが1つも含まれていないことを示します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubstitutionAdvisory {
    /// 探索したトークンの数
    pub tokens_searched: usize,
}

impl fmt::Display for SubstitutionAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no placeholder was replaced ({} tokens searched); check the placeholders in the template",
            self.tokens_searched
        )
    }
}

/// フィールドタグを再生成する際の正規属性
///
/// パス1は一致したタグの属性を、列名とこの3つの値で置き換えます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTagSchema {
    /// `text:table-name`
    pub table_name: String,
    /// `text:table-type`
    pub table_type: String,
    /// `text:database-name`
    pub database_name: String,
}

impl Default for FieldTagSchema {
    fn default() -> Self {
        Self {
            table_name: "Planilha1".to_string(),
            table_type: "table".to_string(),
            database_name: "Formulário propostas Rompedor1".to_string(),
        }
    }
}

impl FieldTagSchema {
    /// 属性値として安全かを検証
    pub(crate) fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("table_name", &self.table_name),
            ("table_type", &self.table_type),
            ("database_name", &self.database_name),
        ] {
            if value.trim().is_empty() {
                return Err(format!("field tag {} must not be empty", name));
            }
            if value.contains(|c: char| matches!(c, '"' | '<' | '&')) {
                return Err(format!(
                    "field tag {} contains a character not allowed in an attribute: '{}'",
                    name, value
                ));
            }
        }
        Ok(())
    }
}

/// デフォルト設定でプレースホルダーを置換する
///
/// # 戻り値
///
/// `(置換後のマークアップ, 合計置換件数)`
///
/// # 使用例
///
/// ```rust
/// use odtfill::{substitute, SubstitutionMapping};
///
/// let mut mapping = SubstitutionMapping::new();
/// mapping.insert("<Cliente>", "Acme Corp");
///
/// let (text, count) = substitute("<p>Cliente: <Cliente></p>", &mapping);
/// assert_eq!(text, "<p>Cliente: Acme Corp</p>");
/// assert_eq!(count, 1);
/// ```
pub fn substitute(markup: &str, mapping: &SubstitutionMapping) -> (String, usize) {
    let outcome = RegexSubstitutor::default().substitute(markup, mapping);
    let count = outcome.count();
    (outcome.text, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_only_when_nothing_replaced() {
        let mut mapping = SubstitutionMapping::new();
        mapping.insert_field("Cliente", "Acme");

        let outcome = SubstitutionOutcome {
            text: String::new(),
            field_tag_replacements: 0,
            literal_replacements: 0,
        };
        let advisory = outcome.advisory(&mapping).unwrap();
        assert_eq!(advisory.tokens_searched, 1);
        assert!(advisory.to_string().contains("no placeholder"));

        let outcome = SubstitutionOutcome {
            literal_replacements: 1,
            ..outcome
        };
        assert!(outcome.advisory(&mapping).is_none());
    }

    #[test]
    fn test_field_tag_schema_validation() {
        assert!(FieldTagSchema::default().validate().is_ok());

        let schema = FieldTagSchema {
            table_name: String::new(),
            ..FieldTagSchema::default()
        };
        assert!(schema.validate().is_err());

        let schema = FieldTagSchema {
            database_name: "a\"b".to_string(),
            ..FieldTagSchema::default()
        };
        assert!(schema.validate().is_err());
    }
}
