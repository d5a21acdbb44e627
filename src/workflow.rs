//! Workflow Module
//!
//! 見積書作成の3ステップ（アップロード → データ選択 → 生成）の状態を保持するモジュール。
//!
//! 状態はすべて`WorkflowContext`が所有し、呼び出し側（CLIや対話的なフロントエンド）が
//! 1セッションにつき1つのインスタンスを持ちます。各遷移は前のステップの入力が揃っている
//! ことを検証し、揃っていなければ`OdtFillError::Workflow`を返します。

use std::fmt;

use tracing::debug;

use crate::builder::{GeneratedDocument, ProposalGenerator};
use crate::error::OdtFillError;
use crate::formatter::{FieldSchema, ValueFormatter};
use crate::spreadsheet::Spreadsheet;
use crate::types::Row;

/// ワークフローのステップ
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Step {
    /// スプレッドシートとテンプレートの読み込み
    #[default]
    Upload,
    /// 行とテンプレートの選択
    Selection,
    /// 文書の生成
    Generation,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Upload => "upload",
            Step::Selection => "selection",
            Step::Generation => "generation",
        };
        f.write_str(name)
    }
}

/// 読み込み済みのテンプレート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// ファイル名
    pub name: String,
    /// ODTのバイト列
    pub bytes: Vec<u8>,
}

/// ワークフローの状態
#[derive(Debug, Default)]
pub struct WorkflowContext {
    step: Step,
    spreadsheet: Option<Spreadsheet>,
    spreadsheet_name: Option<String>,
    templates: Vec<Template>,
    selected_line: Option<usize>,
    selected_template: Option<String>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在のステップ
    pub fn step(&self) -> Step {
        self.step
    }

    /// スプレッドシートを読み込む
    ///
    /// 以前のスプレッドシートと行の選択は破棄されます。
    pub fn load_spreadsheet(&mut self, name: impl Into<String>, spreadsheet: Spreadsheet) {
        let name = name.into();
        debug!(name = %name, rows = spreadsheet.len(), "spreadsheet attached to workflow");
        self.spreadsheet = Some(spreadsheet);
        self.spreadsheet_name = Some(name);
        self.selected_line = None;
    }

    /// テンプレートを読み込む
    ///
    /// 以前に読み込んだテンプレートはすべて置き換えられます。同名のテンプレートは後のものが残ります。
    pub fn load_templates(&mut self, templates: impl IntoIterator<Item = Template>) {
        self.templates.clear();
        for template in templates {
            self.templates.retain(|t| t.name != template.name);
            self.templates.push(template);
        }
        if let Some(selected) = &self.selected_template {
            if !self.templates.iter().any(|t| &t.name == selected) {
                self.selected_template = None;
            }
        }
        debug!(count = self.templates.len(), "templates attached to workflow");
    }

    pub fn spreadsheet(&self) -> Option<&Spreadsheet> {
        self.spreadsheet.as_ref()
    }

    pub fn spreadsheet_name(&self) -> Option<&str> {
        self.spreadsheet_name.as_deref()
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// データ選択ステップへ進む
    ///
    /// スプレッドシートと1つ以上のテンプレートが必要です。
    pub fn advance_to_selection(&mut self) -> Result<(), OdtFillError> {
        if self.spreadsheet.is_none() {
            return Err(workflow_error("load a spreadsheet before selecting data"));
        }
        if self.templates.is_empty() {
            return Err(workflow_error("load at least one template before selecting data"));
        }
        self.transition(Step::Selection);
        Ok(())
    }

    /// 表示行番号で行を選択する
    ///
    /// 範囲外の行番号は`OdtFillError::Spreadsheet`になり、以前の選択は解除されます。
    pub fn select_line(&mut self, line: usize) -> Result<&Row, OdtFillError> {
        self.require_step(Step::Selection)?;
        let spreadsheet = self
            .spreadsheet
            .as_ref()
            .ok_or_else(|| workflow_error("no spreadsheet loaded"))?;

        match spreadsheet.row_at_line(line) {
            Ok(row) => {
                self.selected_line = Some(line);
                Ok(row)
            }
            Err(err) => {
                self.selected_line = None;
                Err(err.into())
            }
        }
    }

    /// テンプレートを名前で選択する
    pub fn select_template(&mut self, name: &str) -> Result<(), OdtFillError> {
        self.require_step(Step::Selection)?;
        if !self.templates.iter().any(|t| t.name == name) {
            return Err(workflow_error(format!("unknown template '{}'", name)));
        }
        self.selected_template = Some(name.to_string());
        Ok(())
    }

    /// 選択中の行
    pub fn selected_row(&self) -> Option<&Row> {
        let line = self.selected_line?;
        self.spreadsheet.as_ref()?.row_at_line(line).ok()
    }

    /// 選択中のテンプレート
    pub fn selected_template(&self) -> Option<&Template> {
        let name = self.selected_template.as_ref()?;
        self.templates.iter().find(|t| &t.name == name)
    }

    /// 生成ステップへ進む
    ///
    /// 行とテンプレートの両方が選択されている必要があります。
    pub fn advance_to_generation(&mut self) -> Result<(), OdtFillError> {
        self.require_step(Step::Selection)?;
        if self.selected_row().is_none() {
            return Err(workflow_error("select a spreadsheet line before generating"));
        }
        if self.selected_template().is_none() {
            return Err(workflow_error("select a template before generating"));
        }
        self.transition(Step::Generation);
        Ok(())
    }

    /// 1つ前のステップに戻る（入力と選択は保持されます）
    pub fn back(&mut self) {
        let previous = match self.step {
            Step::Upload | Step::Selection => Step::Upload,
            Step::Generation => Step::Selection,
        };
        self.transition(previous);
    }

    /// 選択中の行とテンプレートから見積書を生成する
    pub fn generate(
        &self,
        generator: &ProposalGenerator,
        schema: &FieldSchema,
        formatter: &ValueFormatter,
    ) -> Result<GeneratedDocument, OdtFillError> {
        self.require_step(Step::Generation)?;
        let row = self
            .selected_row()
            .ok_or_else(|| workflow_error("no spreadsheet line selected"))?;
        let template = self
            .selected_template()
            .ok_or_else(|| workflow_error("no template selected"))?;

        generator.generate(&template.bytes, row, schema, formatter)
    }

    /// 新しい見積書のために状態を初期化する
    ///
    /// 読み込み済みのテンプレートは保持し、スプレッドシートと選択は破棄します。
    pub fn reset(&mut self) {
        self.spreadsheet = None;
        self.spreadsheet_name = None;
        self.selected_line = None;
        self.selected_template = None;
        self.transition(Step::Upload);
    }

    fn require_step(&self, expected: Step) -> Result<(), OdtFillError> {
        if self.step != expected {
            return Err(workflow_error(format!(
                "expected step '{}', current step is '{}'",
                expected, self.step
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: Step) {
        if self.step != next {
            debug!(from = %self.step, to = %next, "workflow step changed");
        }
        self.step = next;
    }
}

fn workflow_error(message: impl Into<String>) -> OdtFillError {
    OdtFillError::Workflow(message.into())
}
