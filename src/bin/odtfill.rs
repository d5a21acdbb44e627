use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use odtfill::{
    extract, inspect, preview, FieldSchema, OutputFormat, ProposalGenerator,
    ProposalGeneratorBuilder, Spreadsheet, ValueFormatter,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Pdf,
    Docx,
    Odt,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Pdf => OutputFormat::Pdf,
            Format::Docx => OutputFormat::Docx,
            Format::Odt => OutputFormat::Odt,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "odtfill",
    version,
    about = "Fill ODT proposal templates from spreadsheet rows and render them with LibreOffice."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the placeholders (field tags and literal tokens) found in a template.
    Inspect {
        /// ODT template.
        template: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the values a spreadsheet line would insert.
    Preview {
        /// Spreadsheet (.xlsx, .xls, .ods).
        sheet: PathBuf,

        #[command(flatten)]
        line: LineArg,

        /// Show every column instead of the highlighted ones.
        #[arg(long)]
        all: bool,

        /// Print the mapping as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Merge one spreadsheet line into the template and write the ODT.
    Merge {
        sheet: PathBuf,
        template: PathBuf,

        #[command(flatten)]
        line: LineArg,

        /// Output file (default: generated file name in the current directory).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge every spreadsheet line into its own ODT.
    MergeAll {
        sheet: PathBuf,
        template: PathBuf,

        /// Output directory.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Merge one spreadsheet line and render it with LibreOffice.
    Render {
        sheet: PathBuf,
        template: PathBuf,

        #[command(flatten)]
        line: LineArg,

        #[arg(long, value_enum, default_value_t = Format::Pdf)]
        format: Format,

        /// Output directory.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct LineArg {
    /// Spreadsheet line number as shown by the spreadsheet application (first data line is 2).
    #[arg(short, long, default_value_t = 2)]
    line: usize,
}

#[derive(Args)]
struct EngineArgs {
    /// LibreOffice executable (default: $ODTFILL_SOFFICE, PATH, then known install locations).
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Seconds to wait for LibreOffice before killing it.
    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { template, json } => run_inspect(&template, json),
        Command::Preview {
            sheet,
            line,
            all,
            json,
        } => run_preview(&sheet, line.line, all, json),
        Command::Merge {
            sheet,
            template,
            line,
            output,
        } => run_merge(&sheet, &template, line.line, output),
        Command::MergeAll {
            sheet,
            template,
            output_dir,
        } => run_merge_all(&sheet, &template, &output_dir),
        Command::Render {
            sheet,
            template,
            line,
            format,
            output_dir,
            engine,
        } => run_render(&sheet, &template, line.line, format.into(), &output_dir, engine),
    }
}

fn run_inspect(template: &Path, json: bool) -> Result<()> {
    let bytes = read_file(template)?;
    let markup = extract(&bytes).with_context(|| format!("reading {}", template.display()))?;
    let report = inspect(&markup)?;

    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "field tags ({}):", report.field_columns.len())?;
    for column in &report.field_columns {
        writeln!(out, "  {}", column)?;
    }
    writeln!(out, "literal tokens ({}):", report.literal_tokens.len())?;
    for token in &report.literal_tokens {
        writeln!(out, "  {}", token)?;
    }
    if report.is_empty() {
        writeln!(out, "no placeholders found")?;
    }
    Ok(())
}

fn run_preview(sheet_path: &Path, line: usize, all: bool, json: bool) -> Result<()> {
    let sheet = load_sheet(sheet_path)?;
    let row = sheet.row_at_line(line)?;
    let mapping = ValueFormatter::new().build_mapping(row, &schema_for(&sheet));
    let mapping = if all {
        mapping
    } else {
        preview::highlights(&mapping)
    };

    let mut out = std::io::stdout().lock();
    if json {
        preview::render_json(&mapping, &mut out)?;
    } else {
        preview::render_table(&mapping, &mut out)?;
    }
    Ok(())
}

fn run_merge(sheet_path: &Path, template: &Path, line: usize, output: Option<PathBuf>) -> Result<()> {
    let sheet = load_sheet(sheet_path)?;
    let template_bytes = read_file(template)?;
    let row = sheet.row_at_line(line)?;

    let generator = ProposalGeneratorBuilder::new()
        .with_output_format(OutputFormat::Odt)
        .build()?;
    let document = generator.generate(
        &template_bytes,
        row,
        &schema_for(&sheet),
        &ValueFormatter::new(),
    )?;
    if let Some(advisory) = &document.advisory {
        eprintln!("warning: {}", advisory);
    }

    let path = output.unwrap_or_else(|| PathBuf::from(&document.file_name));
    write_file(&path, &document.bytes)?;
    println!(
        "{} ({} placeholders replaced)",
        path.display(),
        document.replacements
    );
    Ok(())
}

fn run_merge_all(sheet_path: &Path, template: &Path, output_dir: &Path) -> Result<()> {
    let sheet = load_sheet(sheet_path)?;
    let template_bytes = read_file(template)?;
    let schema = schema_for(&sheet);
    let formatter = ValueFormatter::new();

    let mappings: Vec<_> = sheet
        .rows()
        .iter()
        .map(|row| formatter.build_mapping(row, &schema))
        .collect();
    let generator: ProposalGenerator = ProposalGeneratorBuilder::new()
        .with_output_format(OutputFormat::Odt)
        .build()?;
    let outcomes = generator.merge_rows(&template_bytes, &mappings)?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let stems = formatter.output_file_stems(sheet.rows());
    for ((row, outcome), stem) in sheet.rows().iter().zip(&outcomes).zip(&stems) {
        let path = output_dir.join(format!("{}.odt", stem));
        write_file(&path, &outcome.document)?;
        if let Some(advisory) = &outcome.advisory {
            eprintln!("warning: line {}: {}", row.line, advisory);
        }
        println!("line {}: {}", row.line, path.display());
    }
    Ok(())
}

fn run_render(
    sheet_path: &Path,
    template: &Path,
    line: usize,
    format: OutputFormat,
    output_dir: &Path,
    engine: EngineArgs,
) -> Result<()> {
    if engine.timeout == 0 {
        bail!("--timeout must be at least 1 second");
    }
    let sheet = load_sheet(sheet_path)?;
    let template_bytes = read_file(template)?;
    let row = sheet.row_at_line(line)?;

    let mut builder = ProposalGeneratorBuilder::new()
        .with_output_format(format)
        .with_render_timeout(Duration::from_secs(engine.timeout));
    if let Some(path) = engine.engine {
        builder = builder.with_engine_path(path);
    }
    let generator = builder.build()?;

    let document = generator
        .generate(&template_bytes, row, &schema_for(&sheet), &ValueFormatter::new())
        .with_context(|| format!("generating line {}", line))?;
    if let Some(advisory) = &document.advisory {
        eprintln!("warning: {}", advisory);
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let path = output_dir.join(&document.file_name);
    write_file(&path, &document.bytes)?;
    println!("{}", path.display());
    Ok(())
}

fn schema_for(sheet: &Spreadsheet) -> FieldSchema {
    FieldSchema::proposal().extended_with(sheet.headers().iter().map(String::as_str))
}

fn load_sheet(path: &Path) -> Result<Spreadsheet> {
    Spreadsheet::from_path(path).with_context(|| format!("reading {}", path.display()))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}
