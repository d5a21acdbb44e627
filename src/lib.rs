//! odtfill - Fill OpenDocument text templates from spreadsheet rows
//!
//! This crate merges one spreadsheet row into an ODT template and renders the
//! result (PDF by default) with a headless LibreOffice. The merge engine works
//! on the container directly: it extracts `content.xml`, replaces placeholders
//! and repackages the archive so that every other entry stays byte-identical.
//!
//! Placeholders come in two encodings:
//!
//! - field tags: `<text:database-display text:column-name="Cliente" ...>...</text:database-display>`
//! - literal tokens typed in the text: `<Cliente>`
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use odtfill::{FieldSchema, ProposalGeneratorBuilder, Spreadsheet, ValueFormatter};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sheet = Spreadsheet::from_path("propostas.xlsx")?;
//!     let template = std::fs::read("modelo.odt")?;
//!
//!     // PDF output through LibreOffice (located automatically)
//!     let generator = ProposalGeneratorBuilder::new().build()?;
//!
//!     let row = sheet.row_at_line(2)?;
//!     let document = generator.generate(
//!         &template,
//!         row,
//!         &FieldSchema::proposal(),
//!         &ValueFormatter::new(),
//!     )?;
//!     std::fs::write(&document.file_name, &document.bytes)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Merge Only
//!
//! ```rust,no_run
//! use odtfill::{ProposalGeneratorBuilder, SubstitutionMapping};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = ProposalGeneratorBuilder::new().build()?;
//! let template = std::fs::read("modelo.odt")?;
//!
//! let mut mapping = SubstitutionMapping::new();
//! mapping.insert_field("Cliente", "Acme Mineração");
//! mapping.insert_field("Valor Kit", "R$ 2.500,00");
//!
//! let merged = generator.merge(&template, &mapping)?;
//! if let Some(advisory) = merged.advisory {
//!     eprintln!("warning: {}", advisory);
//! }
//! std::fs::write("proposta.odt", &merged.document)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Low-level Pipeline
//!
//! ```rust,no_run
//! use odtfill::{extract, rebuild, substitute, SubstitutionMapping};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = std::fs::read("modelo.odt")?;
//! let mut mapping = SubstitutionMapping::new();
//! mapping.insert("<Cliente>", "Acme");
//!
//! let markup = extract(&template)?;
//! let (filled, count) = substitute(&markup, &mapping);
//! let document = rebuild(&template, &filled)?;
//! println!("{} placeholders replaced, {} bytes", count, document.len());
//! # Ok(())
//! # }
//! ```

mod api;
mod builder;
mod container;
mod error;
mod formatter;
pub mod preview;
mod render;
mod security;
mod spreadsheet;
mod substitute;
mod template;
mod types;
mod workflow;

// 公開API
pub use api::{FieldKind, OutputFormat, ValueEscaping};
pub use builder::{GeneratedDocument, MergeOutcome, ProposalGenerator, ProposalGeneratorBuilder};
pub use container::{extract, rebuild, CONTENT_XML_PATH};
pub use error::{
    ExtractionError, OdtFillError, RebuildError, RenderError, SpreadsheetError,
};
pub use formatter::{
    format_brl, format_currency, FieldSchema, FieldSpec, ValueFormatter, FILE_NAME_COLUMN,
};
pub use render::{Renderer, DEFAULT_RENDER_TIMEOUT, ENGINE_ENV_VAR};
pub use security::SecurityConfig;
pub use spreadsheet::Spreadsheet;
pub use substitute::{
    substitute, FieldTagSchema, RegexSubstitutor, SubstitutionAdvisory, SubstitutionEntry,
    SubstitutionMapping, SubstitutionOutcome, Substitutor,
};
pub use template::{inspect, TemplateReport};
pub use types::{CellValue, Row};
pub use workflow::{Step, Template, WorkflowContext};
