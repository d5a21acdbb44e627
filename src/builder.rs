//! Builder Module
//!
//! Fluent Builder APIを提供し、`ProposalGenerator`インスタンスを段階的に構築する。

use std::path::PathBuf;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::api::{OutputFormat, ValueEscaping};
use crate::container::{extract_with, rebuild_with};
use crate::error::{OdtFillError, RenderError};
use crate::formatter::{FieldSchema, ValueFormatter};
use crate::render::{Renderer, DEFAULT_RENDER_TIMEOUT};
use crate::security::SecurityConfig;
use crate::substitute::{
    FieldTagSchema, RegexSubstitutor, SubstitutionAdvisory, SubstitutionMapping, Substitutor,
};
use crate::types::Row;

/// 生成処理の設定を保持する内部構造体
#[derive(Debug, Clone)]
pub(crate) struct GeneratorConfig {
    /// フィールドタグの正規属性
    pub field_tag_schema: FieldTagSchema,

    /// 置換値のエスケープ方式
    pub value_escaping: ValueEscaping,

    /// レンダリングの制限時間
    pub render_timeout: Duration,

    /// エンジンの実行ファイル（Noneの場合は探索）
    pub engine_path: Option<PathBuf>,

    /// 出力フォーマット
    pub output_format: OutputFormat,

    /// アーカイブのセキュリティ制限
    pub security: SecurityConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            field_tag_schema: FieldTagSchema::default(),
            value_escaping: ValueEscaping::Xml,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            engine_path: None,
            output_format: OutputFormat::Pdf,
            security: SecurityConfig::default(),
        }
    }
}

/// Fluent Builder APIを提供する構造体
///
/// `ProposalGenerator`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust,no_run
/// use odtfill::{OutputFormat, ProposalGeneratorBuilder};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), odtfill::OdtFillError> {
/// let generator = ProposalGeneratorBuilder::new()
///     .with_output_format(OutputFormat::Pdf)
///     .with_render_timeout(Duration::from_secs(60))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ProposalGeneratorBuilder {
    /// 内部設定（構築中）
    config: GeneratorConfig,
}

impl ProposalGeneratorBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - フィールドタグ: `Planilha1` / `table` / `Formulário propostas Rompedor1`
    /// - エスケープ: XML
    /// - 制限時間: 120秒
    /// - エンジン: 環境変数`ODTFILL_SOFFICE`、`PATH`、既知のインストール先から探索
    /// - 出力フォーマット: PDF
    pub fn new() -> Self {
        Self::default()
    }

    /// フィールドタグを再生成する際の正規属性を設定する
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use odtfill::{FieldTagSchema, ProposalGeneratorBuilder};
    ///
    /// let builder = ProposalGeneratorBuilder::new().with_field_tag_schema(FieldTagSchema {
    ///     table_name: "Clientes".to_string(),
    ///     ..FieldTagSchema::default()
    /// });
    /// ```
    pub fn with_field_tag_schema(mut self, schema: FieldTagSchema) -> Self {
        self.config.field_tag_schema = schema;
        self
    }

    /// 置換値のエスケープ方式を設定する
    pub fn with_value_escaping(mut self, escaping: ValueEscaping) -> Self {
        self.config.value_escaping = escaping;
        self
    }

    /// レンダリングの制限時間を設定する
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.config.render_timeout = timeout;
        self
    }

    /// エンジンの実行ファイルを明示する
    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.engine_path = Some(path.into());
        self
    }

    /// 出力フォーマットを設定する
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// アーカイブのセキュリティ制限を設定する
    pub fn with_security_config(mut self, security: SecurityConfig) -> Self {
        self.config.security = security;
        self
    }

    /// 設定を検証し、`ProposalGenerator`インスタンスを生成する
    ///
    /// # 戻り値
    ///
    /// * `Ok(ProposalGenerator)` - 設定が有効な場合
    /// * `Err(OdtFillError::Config)` - 設定が無効な場合
    ///   * フィールドタグの属性値が空、または属性に使えない文字を含む
    ///   * 制限時間が0
    ///   * セキュリティ制限が0
    ///
    /// エンジンの存在確認はここでは行いません（`Odt`出力ではエンジンが不要なため）。
    pub fn build(self) -> Result<ProposalGenerator, OdtFillError> {
        // 1. フィールドタグの検証
        self.config
            .field_tag_schema
            .validate()
            .map_err(OdtFillError::Config)?;

        // 2. 制限時間の検証
        if self.config.render_timeout.is_zero() {
            return Err(OdtFillError::Config(
                "render timeout must be greater than zero".to_string(),
            ));
        }

        // 3. セキュリティ制限の検証
        self.config
            .security
            .validate()
            .map_err(OdtFillError::Config)?;

        // 4. ProposalGeneratorインスタンス生成
        Ok(ProposalGenerator::new(self.config))
    }
}

/// 1件の差し込み結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// 再構築されたODT
    pub document: Vec<u8>,
    /// 合計置換件数
    pub replacements: usize,
    /// 置換件数0の場合の警告
    pub advisory: Option<SubstitutionAdvisory>,
}

/// 生成された文書
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    /// 出力ファイル名（拡張子付き）
    pub file_name: String,
    /// 出力フォーマット
    pub format: OutputFormat,
    /// 文書のバイト列
    pub bytes: Vec<u8>,
    /// 合計置換件数
    pub replacements: usize,
    /// 置換件数0の場合の警告
    pub advisory: Option<SubstitutionAdvisory>,
}

/// 見積書生成のファサード
///
/// 抽出 → 置換 → 再構築（→ レンダリング）を順に実行します。
/// 各呼び出しは独自のバッファと一時ディレクトリを使うため、複数スレッドから同時に呼び出せます。
///
/// # 使用例
///
/// ```rust,no_run
/// use odtfill::{ProposalGeneratorBuilder, SubstitutionMapping};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let generator = ProposalGeneratorBuilder::new().build()?;
/// let template = std::fs::read("modelo.odt")?;
///
/// let mut mapping = SubstitutionMapping::new();
/// mapping.insert_field("Cliente", "Acme Mineração");
///
/// let merged = generator.merge(&template, &mapping)?;
/// std::fs::write("proposta.odt", &merged.document)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProposalGenerator {
    /// 生成設定
    config: GeneratorConfig,

    /// プレースホルダー置換
    substitutor: RegexSubstitutor,
}

impl ProposalGenerator {
    pub(crate) fn new(config: GeneratorConfig) -> Self {
        Self {
            substitutor: RegexSubstitutor::new(
                config.field_tag_schema.clone(),
                config.value_escaping,
            ),
            config,
        }
    }

    /// 出力フォーマット
    pub fn output_format(&self) -> OutputFormat {
        self.config.output_format
    }

    /// テンプレートにマッピングを差し込み、ODTを再構築する
    ///
    /// # 引数
    ///
    /// * `template` - テンプレートのODT（変更されません）
    /// * `mapping` - プレースホルダーと置換値
    ///
    /// # 戻り値
    ///
    /// * `Ok(MergeOutcome)` - 再構築されたODTと置換件数。置換件数0でも成功として扱います
    /// * `Err(OdtFillError::Extraction)` - テンプレートが読み込めない場合
    /// * `Err(OdtFillError::Rebuild)` - 再構築に失敗した場合
    pub fn merge(
        &self,
        template: &[u8],
        mapping: &SubstitutionMapping,
    ) -> Result<MergeOutcome, OdtFillError> {
        let markup = extract_with(template, &self.config.security)?;
        self.merge_markup(template, &markup, mapping)
    }

    /// 1つのテンプレートに複数のマッピングを並列に差し込む
    ///
    /// マッピングごとに独立した文書を生成し、結果は入力と同じ順序で返します。
    /// テンプレートの抽出は1回だけ行います。
    pub fn merge_rows(
        &self,
        template: &[u8],
        mappings: &[SubstitutionMapping],
    ) -> Result<Vec<MergeOutcome>, OdtFillError> {
        let markup = extract_with(template, &self.config.security)?;
        info!(documents = mappings.len(), "merging template in batch");

        mappings
            .par_iter()
            .map(|mapping| self.merge_markup(template, &markup, mapping))
            .collect()
    }

    fn merge_markup(
        &self,
        template: &[u8],
        markup: &str,
        mapping: &SubstitutionMapping,
    ) -> Result<MergeOutcome, OdtFillError> {
        let outcome = self.substitutor.substitute(markup, mapping);
        let advisory = outcome.advisory(mapping);
        if let Some(advisory) = &advisory {
            warn!(tokens = advisory.tokens_searched, "{}", advisory);
        }
        debug!(
            field_tags = outcome.field_tag_replacements,
            literals = outcome.literal_replacements,
            "placeholders substituted"
        );

        let document = rebuild_with(template, &outcome.text, &self.config.security)?;
        Ok(MergeOutcome {
            document,
            replacements: outcome.count(),
            advisory,
        })
    }

    /// 設定に従ってレンダラーを用意する
    pub fn renderer(&self) -> Result<Renderer, RenderError> {
        Ok(Renderer::locate(self.config.engine_path.as_deref())?
            .with_timeout(self.config.render_timeout))
    }

    /// 再構築済みのODTを出力フォーマットに変換する
    ///
    /// `Odt`出力の場合はエンジンを探索せず、そのまま返します。
    pub fn render(&self, document: &[u8], file_stem: &str) -> Result<Vec<u8>, OdtFillError> {
        let format = self.config.output_format;
        if !format.requires_engine() {
            return Ok(document.to_vec());
        }
        Ok(self.renderer()?.render(document, file_stem, format)?)
    }

    /// スプレッドシートの1行から見積書を生成する
    ///
    /// # 処理フロー
    ///
    /// 1. 値フォーマッターで行をマッピングに変換
    /// 2. テンプレートに差し込み、ODTを再構築
    /// 3. 出力フォーマットに変換
    /// 4. 出力ファイル名を決定（`NOME DO ARQUIVO`列、または`Proposta_{Cliente}_{YYYYMMDD}`）
    pub fn generate(
        &self,
        template: &[u8],
        row: &Row,
        schema: &FieldSchema,
        formatter: &ValueFormatter,
    ) -> Result<GeneratedDocument, OdtFillError> {
        let mapping = formatter.build_mapping(row, schema);
        let merged = self.merge(template, &mapping)?;

        let file_stem = formatter.output_file_stem(row);
        let format = self.config.output_format;
        let bytes = self.render(&merged.document, &file_stem)?;

        info!(
            line = row.line,
            file = %file_stem,
            replacements = merged.replacements,
            "proposal generated"
        );

        Ok(GeneratedDocument {
            file_name: format!("{}.{}", file_stem, format.extension()),
            format,
            bytes,
            replacements: merged.replacements,
            advisory: merged.advisory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::extract;
    use crate::container::test_support::build_odt;
    use chrono::NaiveDate;

    const TEMPLATE_XML: &str = r#"<office:text><text:p>Cliente: <text:database-display text:column-name="Cliente" text:table-name="Antiga" text:table-type="table" text:database-name="Outra">&lt;Cliente&gt;</text:database-display></text:p><text:p>Total: &lt;Valor Kit&gt; em &lt;Data&gt;</text:p></office:text>"#;

    #[test]
    fn test_builder_defaults() {
        let builder = ProposalGeneratorBuilder::new();
        assert_eq!(builder.config.field_tag_schema, FieldTagSchema::default());
        assert_eq!(builder.config.value_escaping, ValueEscaping::Xml);
        assert_eq!(builder.config.render_timeout, Duration::from_secs(120));
        assert!(builder.config.engine_path.is_none());
        assert_eq!(builder.config.output_format, OutputFormat::Pdf);
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = ProposalGeneratorBuilder::new()
            .with_value_escaping(ValueEscaping::Verbatim)
            .with_render_timeout(Duration::from_secs(5))
            .with_engine_path("/opt/libreoffice/program/soffice")
            .with_output_format(OutputFormat::Docx);

        assert_eq!(builder.config.value_escaping, ValueEscaping::Verbatim);
        assert_eq!(builder.config.render_timeout, Duration::from_secs(5));
        assert_eq!(
            builder.config.engine_path,
            Some(PathBuf::from("/opt/libreoffice/program/soffice"))
        );
        assert_eq!(builder.config.output_format, OutputFormat::Docx);
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let result = ProposalGeneratorBuilder::new()
            .with_render_timeout(Duration::ZERO)
            .build();
        match result {
            Err(OdtFillError::Config(msg)) => assert!(msg.contains("timeout")),
            other => panic!("Expected Config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_rejects_invalid_field_tag_schema() {
        let result = ProposalGeneratorBuilder::new()
            .with_field_tag_schema(FieldTagSchema {
                table_type: "<table>".to_string(),
                ..FieldTagSchema::default()
            })
            .build();
        assert!(matches!(result, Err(OdtFillError::Config(_))));
    }

    #[test]
    fn test_build_rejects_zero_security_limit() {
        let result = ProposalGeneratorBuilder::new()
            .with_security_config(SecurityConfig {
                max_entry_count: 0,
                ..SecurityConfig::default()
            })
            .build();
        assert!(matches!(result, Err(OdtFillError::Config(_))));
    }

    #[test]
    fn test_merge_replaces_both_encodings() {
        let generator = ProposalGeneratorBuilder::new().build().unwrap();
        let template = build_odt(TEMPLATE_XML);

        let mut mapping = SubstitutionMapping::new();
        mapping.insert_field("Cliente", "Silva & Filhos");
        mapping.insert_field("Valor Kit", "R$ 2.500,00");

        let outcome = generator.merge(&template, &mapping).unwrap();
        assert_eq!(outcome.replacements, 2);
        assert!(outcome.advisory.is_none());

        let markup = extract(&outcome.document).unwrap();
        assert!(markup.contains(r#"text:table-name="Planilha1""#));
        assert!(markup.contains("Silva &amp; Filhos</text:database-display>"));
        assert!(markup.contains("Total: R$ 2.500,00 em &lt;Data&gt;"));

        // テンプレート自体は変更されない
        assert_eq!(extract(&template).unwrap(), TEMPLATE_XML);
    }

    #[test]
    fn test_merge_without_matches_is_advisory() {
        let generator = ProposalGeneratorBuilder::new().build().unwrap();
        let template = build_odt("<office:text><text:p>Sem campos</text:p></office:text>");

        let mut mapping = SubstitutionMapping::new();
        mapping.insert_field("Cliente", "Acme");

        let outcome = generator.merge(&template, &mapping).unwrap();
        assert_eq!(outcome.replacements, 0);
        assert_eq!(
            outcome.advisory,
            Some(SubstitutionAdvisory { tokens_searched: 1 })
        );
        assert_eq!(
            extract(&outcome.document).unwrap(),
            "<office:text><text:p>Sem campos</text:p></office:text>"
        );
    }

    #[test]
    fn test_merge_invalid_template() {
        let generator = ProposalGeneratorBuilder::new().build().unwrap();
        let result = generator.merge(b"not a container", &SubstitutionMapping::new());
        assert!(matches!(result, Err(OdtFillError::Extraction(_))));
    }

    #[test]
    fn test_merge_rows_keeps_documents_independent() {
        let generator = ProposalGeneratorBuilder::new().build().unwrap();
        let template = build_odt(TEMPLATE_XML);

        let mappings: Vec<SubstitutionMapping> = ["Alfa", "Beta", "Gama"]
            .iter()
            .map(|client| [("<Cliente>", *client)].into_iter().collect())
            .collect();

        let outcomes = generator.merge_rows(&template, &mappings).unwrap();
        assert_eq!(outcomes.len(), 3);
        for (outcome, client) in outcomes.iter().zip(["Alfa", "Beta", "Gama"]) {
            let markup = extract(&outcome.document).unwrap();
            assert!(markup.contains(&format!(">{}</text:database-display>", client)));
            assert_eq!(markup.matches("</text:database-display>").count(), 1);
        }
    }

    #[test]
    fn test_generate_odt_output() {
        let generator = ProposalGeneratorBuilder::new()
            .with_output_format(OutputFormat::Odt)
            .build()
            .unwrap();
        let template = build_odt(TEMPLATE_XML);
        let row = Row::new(2)
            .with_cell("Cliente", "Pedreira São Jorge")
            .with_cell("Valor Kit", 1200.0);
        let formatter = ValueFormatter::with_today(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());

        let generated = generator
            .generate(&template, &row, &FieldSchema::proposal(), &formatter)
            .unwrap();

        assert_eq!(generated.file_name, "Proposta_Pedreira_São_Jorge_20250102.odt");
        assert_eq!(generated.format, OutputFormat::Odt);
        // Cliente（フィールドタグ）+ Valor Kit + Data
        assert_eq!(generated.replacements, 3);

        let markup = extract(&generated.bytes).unwrap();
        assert!(markup.contains("Total: R$ 1.200,00 em 02/01/2025"));
    }

    #[test]
    fn test_render_with_missing_engine() {
        let generator = ProposalGeneratorBuilder::new()
            .with_engine_path("/nonexistent/odtfill/soffice")
            .build()
            .unwrap();
        let result = generator.render(b"odt", "x");
        assert!(matches!(
            result,
            Err(OdtFillError::Render(RenderError::EngineNotFound { .. }))
        ));
    }
}
