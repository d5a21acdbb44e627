//! Substitution Mapping
//!
//! 1行分のデータから構築される「プレースホルダートークン → 置換値」の
//! 順序付きマッピング。

use serde::Serialize;

/// マッピングの1エントリ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstitutionEntry {
    /// 文書中に現れるトークン（例: `<Cliente>`）
    pub token: String,
    /// 対応する列名（例: `Cliente`）
    ///
    /// `Some`の場合、`text:database-display`タグの置換対象にもなります。
    pub field: Option<String>,
    /// フォーマット済みの置換値
    pub value: String,
}

/// プレースホルダートークンから置換値への順序付きマッピング
///
/// トークンは一意で、挿入順が保持されます。同じトークンを再度挿入した場合は
/// 値のみが更新され、位置は変わりません。
///
/// # 使用例
///
/// ```rust
/// use odtfill::SubstitutionMapping;
///
/// let mut mapping = SubstitutionMapping::new();
/// mapping.insert_field("Cliente", "Acme Corp");
/// mapping.insert("<Valor Kit>", "R$ 1.234,56");
///
/// assert_eq!(mapping.get("<Cliente>"), Some("Acme Corp"));
/// assert_eq!(mapping.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubstitutionMapping {
    entries: Vec<SubstitutionEntry>,
}

impl SubstitutionMapping {
    /// 空のマッピングを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// トークンを指定して値を登録する
    ///
    /// トークンが`<...>`の形をしている場合、括弧の内側を列名とみなします。
    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        let field = field_name_of(&token).map(str::to_string);
        self.upsert(token, field, value.into());
    }

    /// 列名を指定して値を登録する（トークンは`<列名>`）
    pub fn insert_field(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let token = format!("<{}>", field);
        self.upsert(token, Some(field), value.into());
    }

    /// 列名を持たない、文字列としてのみ置換されるトークンを登録する
    pub fn insert_literal(&mut self, token: impl Into<String>, value: impl Into<String>) {
        self.upsert(token.into(), None, value.into());
    }

    fn upsert(&mut self, token: String, field: Option<String>, value: String) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.token == token) {
            existing.field = field;
            existing.value = value;
        } else {
            self.entries.push(SubstitutionEntry {
                token,
                field,
                value,
            });
        }
    }

    /// トークンに対応する値を取得
    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.token == token)
            .map(|e| e.value.as_str())
    }

    /// 列名に対応するエントリを取得
    pub fn get_field(&self, field: &str) -> Option<&SubstitutionEntry> {
        self.entries
            .iter()
            .find(|e| e.field.as_deref() == Some(field))
    }

    /// 挿入順にエントリを走査
    pub fn iter(&self) -> impl Iterator<Item = &SubstitutionEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubstitutionMapping {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut mapping = Self::new();
        for (token, value) in iter {
            mapping.insert(token, value);
        }
        mapping
    }
}

/// `<列名>`形式のトークンから列名を取り出す
fn field_name_of(token: &str) -> Option<&str> {
    token
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .filter(|inner| !inner.is_empty() && !inner.contains(|c: char| c == '<' || c == '>'))
}
