//! postal-labels - check address lists and print them on label sheets.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use postal_labels::{
    AddressChecker, CheckerConfig, Confirmer, Error, FixedAnswer, HomeCountry, LabelSheet,
    RecordNormalizer, Result, Service, TerminalConfirmer, read_input_dir,
};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}) {msg}";

/// Output file name inside the output directory.
const OUTPUT_FILE: &str = "labels.pdf";

#[derive(Parser, Debug)]
#[command(name = "postal-labels")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding the input .csv files
    #[arg(long, default_value = "input")]
    input: PathBuf,

    /// Directory receiving the label sheet and audit logs; must be empty
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Credentials file with the geocoder API key
    #[arg(long, env = "POSTAL_LABELS_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Name of the home country as written in the input
    #[arg(long, default_value = "Netherlands")]
    home_country: String,

    /// ISO code of the home country
    #[arg(long, default_value = "NL")]
    home_country_code: String,

    /// Check and correct addresses without asking
    #[arg(long, conflicts_with = "skip_check")]
    check: bool,

    /// Skip the address check without asking
    #[arg(long)]
    skip_check: bool,

    /// Keep every address that could not be validated
    #[arg(long, conflicts_with = "no")]
    yes: bool,

    /// Drop every address that could not be validated
    #[arg(long)]
    no: bool,

    /// Log debug output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn home(&self) -> HomeCountry {
        HomeCountry::new(&self.home_country, &self.home_country_code)
    }

    /// Fixed answer for undecided records, when one was given.
    fn fixed_answer(&self) -> Option<FixedAnswer> {
        match (self.yes, self.no) {
            (true, _) => Some(FixedAnswer(true)),
            (_, true) => Some(FixedAnswer(false)),
            _ => None,
        }
    }
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "postal_labels=debug"
    } else if cli.quiet {
        "postal_labels=warn"
    } else {
        "postal_labels=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Create `dir` when missing, refusing one that already has content.
fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if fs::read_dir(dir)?.next().is_some() {
            return Err(Error::config(format!(
                "The output directory '{}' is not empty, please delete its contents",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    progress.set_message("checking addresses");
    progress
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let home = cli.home();
    let terminal = TerminalConfirmer::new();

    if !cli.input.exists() {
        fs::create_dir_all(&cli.input)?;
    }
    prepare_output_dir(&cli.output)?;

    let batch = read_input_dir(&cli.input, &home)?;
    if batch.records.is_empty() && batch.erroneous_lines.is_empty() {
        return Err(Error::input(format!(
            "No .csv files with entries found in '{}'",
            cli.input.display()
        )));
    }

    if !batch.erroneous_lines.is_empty() {
        println!("----------");
        println!(
            "Encountered {} erroneous line(s) in the input csv file(s):",
            batch.erroneous_lines.len()
        );
        for line in &batch.erroneous_lines {
            println!("{line}");
        }
        println!("----------");

        let exit = cli.fixed_answer().is_none()
            && terminal.confirm(
                "We will continue with the remaining entries if you don't exit. Do you want to exit?",
                Some(true),
            );
        if exit {
            return Ok(());
        }
    }
    println!("Read {} data entries", batch.records.len());

    let mut records = batch.records;
    let normalizer = RecordNormalizer::new(home.clone());
    normalizer.prepare_batch(&mut records);

    let check = if cli.check || cli.skip_check {
        cli.check
    } else {
        terminal.confirm(
            "Entries can be checked and corrected using various APIs. Do you want to do this?",
            Some(true),
        )
    };

    if check {
        let mut config = CheckerConfig::builder().home_country(home.clone());
        if let Some(credentials) = &cli.credentials {
            config = config.credentials_path(credentials);
        }
        let checker = AddressChecker::with_config(config.build()).await?;

        let progress = progress_bar();
        let interactive = TerminalConfirmer::new().with_progress(progress.clone());
        let fixed = cli.fixed_answer();
        let confirmer: &dyn Confirmer = match &fixed {
            Some(answer) => answer,
            None => &interactive,
        };

        let report = checker
            .correct_batch(&mut records, confirmer, Some(progress))
            .await;
        report.write_logs(&cli.output, &home)?;

        println!("Number of invalid addresses: {}", report.invalid.len());
        println!("Number of changed addresses: {}", report.changed.len());
        for service in [Service::Register, Service::Geocoder] {
            info!("{}", checker.profiler().summary(service));
        }
    }

    normalizer.finalize_batch(&mut records);

    let output = cli.output.join(OUTPUT_FILE);
    println!("Exporting {} addresses to {}...", records.len(), output.display());
    LabelSheet::layout(&records, &home).write_pdf(&output)?;

    println!("Generation complete!");
    Ok(())
}
