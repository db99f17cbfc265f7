use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use recibo_core::RawOcrResult;
use recibo_parse::{ParseOptions, ReceiptParser, Tuning};
use recibo_templates::TemplateCatalog;

struct Args {
    receipt: PathBuf,
    templates: Option<PathBuf>,
    tuning: Option<PathBuf>,
    user_id: Option<String>,
    today: Option<NaiveDate>,
}

const USAGE: &str = "usage: recibo <receipt.txt> [--templates <catalog.toml>] \
[--tuning <tuning.toml>] [--user-id <id>] [--today <YYYY-MM-DD>]";

fn parse_args() -> Result<Args> {
    let mut receipt = None;
    let mut templates = None;
    let mut tuning = None;
    let mut user_id = None;
    let mut today = None;

    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--templates" => {
                templates = Some(PathBuf::from(
                    argv.next().context("--templates needs a path")?,
                ));
            }
            "--tuning" => {
                tuning = Some(PathBuf::from(argv.next().context("--tuning needs a path")?));
            }
            "--user-id" => {
                user_id = Some(argv.next().context("--user-id needs a value")?);
            }
            "--today" => {
                let raw = argv.next().context("--today needs a date")?;
                today = Some(
                    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                        .with_context(|| format!("bad --today date: {raw}"))?,
                );
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown flag: {other}\n{USAGE}"),
            other => {
                if receipt.is_some() {
                    bail!("only one receipt file at a time\n{USAGE}");
                }
                receipt = Some(PathBuf::from(other));
            }
        }
    }

    Ok(Args {
        receipt: receipt.with_context(|| format!("no receipt file given\n{USAGE}"))?,
        templates,
        tuning,
        user_id,
        today,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = parse_args()?;

    let catalog = match &args.templates {
        Some(path) => TemplateCatalog::from_path(path)
            .with_context(|| format!("loading templates from {}", path.display()))?,
        None => TemplateCatalog::builtin(),
    };
    let tuning = match &args.tuning {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Tuning::from_toml(&raw)
                .with_context(|| format!("parsing tuning from {}", path.display()))?
        }
        None => Tuning::default(),
    };

    let text = std::fs::read_to_string(&args.receipt)
        .with_context(|| format!("reading {}", args.receipt.display()))?;
    tracing::debug!(file = %args.receipt.display(), bytes = text.len(), "parsing receipt");

    let parser = ReceiptParser::new(Arc::new(catalog), tuning);
    let input = RawOcrResult::from_text(text, 1.0);
    let opts = ParseOptions {
        user_id: args.user_id,
        today: args.today,
    };
    let result = parser.parse(&input, &opts);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
