use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use doc_annotator::{Annotator, OcrSettings};

#[derive(Parser, Debug)]
#[command(
    name = "doc-annotator",
    version,
    about = "Stamp text annotations onto images and PDFs"
)]
struct Cli {
    /// Image (.png, .jpg, .jpeg) or PDF to annotate
    input: PathBuf,

    /// Where to write the annotated copy
    output: PathBuf,

    /// Annotation config (.json or .toml); a single SAMPLE stamp when omitted
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Tesseract languages for anchor lookup (e.g. "eng+deu")
    #[arg(long = "ocr-lang", default_value = "eng")]
    ocr_lang: String,

    /// Tesseract page segmentation mode
    #[arg(long = "psm")]
    psm: Option<u32>,

    /// Print progress and a summary of every placed annotation
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    doc_annotator::logging::init(cli.verbose)?;

    let annotator = Annotator::system(OcrSettings {
        languages: cli.ocr_lang,
        psm: cli.psm,
    });
    let report = annotator
        .annotate(&cli.input, &cli.output, cli.config.as_deref())
        .with_context(|| format!("failed to annotate {}", cli.input.display()))?;

    if cli.verbose {
        for line in report.summary_lines() {
            println!("{}", line);
        }
    }
    println!("{}", cli.output.display());
    Ok(())
}
