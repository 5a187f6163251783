//! `folio` command line

mod logging;
pub mod script;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use folio_core::{export, parse_page_ranges, EditorConfig, FontService, FormFieldKind, Session};
use folio_engine::{default_renderer, extract_pages, merge_documents, LopdfWriter, Renderer};
use serde::Serialize;

use crate::script::EditScript;

#[derive(Debug, Parser)]
#[command(name = "folio")]
#[command(about = "Annotate, fill and reassemble PDF documents")]
pub struct Cli {
    /// Increase log output (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Editor configuration file (JSON); defaults come from FOLIO_* variables
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Apply an edit script and write the edited document.
    Apply {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "EDITS.json")]
        edits: PathBuf,
        /// Defaults to `<name>_edited.pdf` next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Concatenate documents in order.
    Merge {
        #[arg(value_name = "FILE", required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Copy selected pages into a new document.
    Split {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Page ranges such as `1-3,5`
        #[arg(long)]
        pages: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageOutput>,
    fields: Vec<FieldOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    page: u32,
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct FieldOutput {
    name: String,
    kind: &'static str,
    page: u32,
}

#[derive(Debug, Serialize)]
struct ApplyOutput {
    output: String,
    elements: usize,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    page: u32,
    kind: &'static str,
    message: String,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    logging::init(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file, cli.config.as_deref()),
        Commands::Apply { file, edits, output } => {
            run_apply(&file, &edits, output.as_deref(), cli.config.as_deref())
        }
        Commands::Merge { files, output } => run_merge(&files, &output),
        Commands::Split { file, pages, output } => run_split(&file, &pages, &output),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    match path {
        Some(path) => EditorConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => EditorConfig::from_env().context("invalid FOLIO_* configuration"),
    }
}

fn open_session(file: &Path, config: EditorConfig) -> Result<Session<folio_engine::LopdfRenderer>> {
    ensure_pdf_exists(file)?;
    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    let fonts = FontService::new().with_max_attempts(config.font_fetch_attempts);
    Session::open(default_renderer(), bytes, file_name, config, fonts)
        .context("failed to open PDF")
}

fn run_info(file: &Path, config: Option<&Path>) -> Result<()> {
    let session = open_session(file, load_config(config)?)?;

    let pages = (1..=session.page_count())
        .map(|page| {
            let size = session.page_size(page)?;
            Ok(PageOutput {
                page,
                width: size.width_pt,
                height: size.height_pt,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut fields: Vec<FieldOutput> = session
        .layers()
        .fields
        .iter()
        .map(|field| FieldOutput {
            name: field.name.clone(),
            kind: match field.kind {
                FormFieldKind::Text { .. } => "text",
                FormFieldKind::Checkbox { .. } => "checkbox",
                FormFieldKind::Choice { .. } => "choice",
            },
            page: field.page,
        })
        .collect();
    fields.sort_by(|a, b| a.page.cmp(&b.page).then_with(|| a.name.cmp(&b.name)));

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: session.page_count(),
        pages,
        fields,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    session.close();
    Ok(())
}

fn run_apply(file: &Path, edits: &Path, output: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let script = EditScript::from_file(edits)?;
    let mut session = open_session(file, load_config(config)?)?;

    let base_dir = edits.parent().unwrap_or_else(|| Path::new("."));
    let elements = script.apply(&mut session, base_dir)?;

    let report = export(&mut session, &LopdfWriter::new()).context("failed to export PDF")?;
    let output = output
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| file.with_file_name(&report.file_name));
    write_output(&output, &report.bytes)?;

    for failure in &report.failures {
        tracing::warn!(page = failure.page, kind = failure.kind.name(), "{}", failure.message);
    }
    let payload = ApplyOutput {
        output: output.display().to_string(),
        elements,
        failures: report
            .failures
            .iter()
            .map(|failure| FailureOutput {
                page: failure.page,
                kind: failure.kind.name(),
                message: failure.message.clone(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_merge(files: &[PathBuf], output: &Path) -> Result<()> {
    let sources = files
        .iter()
        .map(|file| {
            ensure_pdf_exists(file)?;
            fs::read(file).with_context(|| format!("failed to read {}", file.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let merged = merge_documents(&sources).context("failed to merge PDFs")?;
    write_output(output, &merged)?;
    println!("{}", output.display());
    Ok(())
}

fn run_split(file: &Path, pages: &str, output: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;
    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let mut renderer = default_renderer();
    let handle = renderer.load_document(&bytes).context("failed to open PDF")?;
    let page_count = renderer.page_count(handle)?;
    renderer.close(handle)?;

    let ranges = parse_page_ranges(pages, page_count)?;
    let selected = folio_core::expand(&ranges);
    let extracted = extract_pages(&bytes, &selected).context("failed to extract pages")?;
    write_output(output, &extracted)?;
    println!("{}", output.display());
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
