use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use log::{info, warn};

use docfill::config::{
    init_default_config, load_config, load_values_file, resolve_config_path, AppConfig,
};
use docfill::docx::{decode_docx, default_output_for, encode_docx};
use docfill::pipeline::{FillSession, TraceWriter};
use docfill::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "docfill")]
#[command(about = "Find and fill placeholders in .docx templates", long_about = None)]
struct Args {
    /// Write a commented default docfill.toml, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file to (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .docx
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output .docx (default: <input_stem>_filled.docx)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Config file path (default: $DOCFILL_CONFIG, then docfill.toml searched upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Answers keyed by placeholder key (TOML, or JSON by extension)
    #[arg(long, value_name = "FILE")]
    values: Option<PathBuf>,

    /// Write the detected placeholders as JSON
    #[arg(long, value_name = "JSON")]
    catalog_json: Option<PathBuf>,

    /// Write the filled plain text
    #[arg(long, value_name = "TXT")]
    preview: Option<PathBuf>,

    /// Fail when a placeholder has no answer or an answer has no place in the document
    #[arg(long)]
    strict: bool,

    /// Dump intermediate text, markup and catalog to this directory
    #[arg(long, value_name = "DIR")]
    trace_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// No logging
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::from_flags(args.verbose, args.quiet).install()?;

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  docfill <template.docx>                     list placeholders\n  docfill <template.docx> --values answers.toml   fill them\n"
            );
            return Ok(());
        }
    };

    let workdir = input
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let cfg = match resolve_config_path(args.config.as_deref(), &workdir) {
        Some(path) => {
            info!("config: {}", path.display());
            load_config(&path)?
        }
        None => AppConfig::default(),
    };

    let trace = match args.trace_dir.clone() {
        Some(dir) => TraceWriter::new(dir, true)?,
        None => TraceWriter::disabled(),
    };

    let doc = decode_docx(&input).with_context(|| format!("decode {}", input.display()))?;
    info!("read {} ({} chars of text)", doc.part_name, doc.text.chars().count());
    trace.write_named_text("text.txt", &doc.text)?;
    trace.write_named_bytes("document.xml", &doc.markup)?;

    let mut session = FillSession::from_config(doc.text.clone(), doc.markup.clone(), &cfg);
    trace.write_json("catalog.json", session.catalog())?;
    if let Some(path) = args.catalog_json.as_ref() {
        let json = serde_json::to_string_pretty(session.catalog()).context("serialize catalog")?;
        std::fs::write(path, json).with_context(|| format!("write catalog: {}", path.display()))?;
    }

    if let Some(path) = args.values.as_ref() {
        let answers = load_values_file(path)?;
        for key in session.answer_all(&answers) {
            warn!("{}: no placeholder with key {key:?}", path.display());
        }
    }

    print_catalog(&session);
    let total = session.catalog().keys().len();
    progress.progress("answered", total - session.missing().len(), total);

    if let Some(path) = args.preview.as_ref() {
        let text = session.preview();
        std::fs::write(path, &text).with_context(|| format!("write preview: {}", path.display()))?;
    }

    let wants_output = args.output.is_some() || args.values.is_some() || !session.values().is_empty();
    if !wants_output {
        return Ok(());
    }
    trace.write_named_text("preview.txt", &session.preview())?;

    let filled = session.render_checked(args.strict)?;
    trace.write_named_bytes("filled.xml", &filled.bytes)?;
    let output = args.output.unwrap_or_else(|| default_output_for(&input));
    let sites: usize = filled.report.sites.values().sum();
    encode_docx(&doc.package, &doc.part_name, filled.bytes, &output)?;
    progress.info(format!(
        "wrote {} ({sites} substitution(s), {} unplaced)",
        output.display(),
        filled.report.unmatched.len()
    ));
    Ok(())
}

fn print_catalog(session: &FillSession) {
    let catalog = session.catalog();
    if catalog.is_empty() {
        println!("no placeholders found");
        return;
    }
    for key in catalog.sorted_keys() {
        let Some(desc) = catalog.primary(key) else {
            continue;
        };
        let count: usize = catalog.by_key(key).map(|d| d.occurrences.len().max(1)).sum();
        let party = desc.party.map(|p| format!(" ({p})")).unwrap_or_default();
        let status = match session.values().value_of(key) {
            Some(v) => format!("= {v}"),
            None => "(missing)".to_string(),
        };
        println!("{key}{party}  {}  x{count}  {status}", desc.original_token);
    }
}
