//! nus-update command line
//!
//! Downloads the latest system update for one region and writes every title
//! as a WAD into `nus-update Downloads (<REGION>)`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nus_update::error::{EXIT_CANCELLED, EXIT_OK, EXIT_PARTIAL, EXIT_USAGE};
use nus_update::{
    Config, Event, RunSummary, TitlePolicy, ToExitCode, UpdateFetcher, UpdateRequest,
    cancel_on_signal, validate_region,
};

#[derive(Parser)]
#[command(name = "nus-update")]
#[command(
    version,
    about = "Download the latest Wii system update from NUS as WAD files"
)]
struct Cli {
    /// Region to download: USA, EUR, JPN, KOR or TWN
    region: String,

    /// Also download boot2 (asks for confirmation)
    #[arg(long, visible_alias = "boot2")]
    include_sensitive: bool,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory that receives the region folder (default: current directory)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// SOAP endpoint of the update service
    #[arg(long, value_name = "URL")]
    soap_url: Option<String>,

    /// Base URL of the content CDN
    #[arg(long, value_name = "URL")]
    content_url: Option<String>,

    /// Download contents from the Wii U CDN instead of the Wii one
    #[arg(long)]
    wiiu_endpoint: bool,
}

impl Cli {
    fn load_config(&self) -> nus_update::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &self.output_dir {
            config.output.root = Some(dir.clone());
        }
        if let Some(url) = &self.soap_url {
            config.nus.soap_url = url.clone();
        }
        if let Some(url) = &self.content_url {
            config.nus.content_url = Some(url.clone());
        }
        if self.wiiu_endpoint {
            config.nus.wiiu_endpoint = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            e.print().ok();
            return exit(EXIT_USAGE);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let region = match validate_region(&cli.region) {
        Ok(region) => region,
        Err(e) => {
            eprintln!("{}", e);
            return exit(e.exit_code());
        }
    };

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit(e.exit_code());
        }
    };

    let include_sensitive = cli.include_sensitive && confirm_sensitive(&config).await;
    let policy = TitlePolicy {
        sensitive_title: config.sensitive_title,
        include_sensitive,
    };
    let request = UpdateRequest::with_device_id(region, config.nus.device_id.clone());

    let token = CancellationToken::new();
    let fetcher = match UpdateFetcher::new(config) {
        Ok(fetcher) => fetcher.with_cancel_token(token.clone()),
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit(e.exit_code());
        }
    };

    let printer = tokio::spawn(print_events(fetcher.subscribe()));
    let signals = tokio::spawn(cancel_on_signal(token.clone()));

    let result = fetcher.run(&request, &policy).await;

    // Dropping the last sender closes the channel so the printer drains and stops
    drop(fetcher);
    printer.await.ok();
    signals.abort();

    match result {
        Ok(summary) => {
            print_summary(&summary);
            exit(summary_exit_code(&summary))
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(e.exit_code())
        }
    }
}

/// Ask before downloading the sensitive title; only an explicit `yes` counts
async fn confirm_sensitive(config: &Config) -> bool {
    let mut stdout = tokio::io::stdout();
    let prompt = format!(
        "Title {} (boot2) is dangerous to install and rarely needed.\n\
         Type 'yes' to download it anyway: ",
        config.sensitive_title
    );
    if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
        return false;
    }

    let mut answer = String::new();
    match BufReader::new(tokio::io::stdin()).read_line(&mut answer).await {
        Ok(_) => is_confirmation(&answer),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read confirmation, keeping title excluded");
            false
        }
    }
}

fn is_confirmation(answer: &str) -> bool {
    answer.trim().to_lowercase() == "yes"
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<Event>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Progress output fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &Event) {
    match event {
        Event::TitlesListed {
            region,
            count,
            skipped,
        } => {
            println!("Found {} titles in the {} system update.", count, region);
            if *skipped > 0 {
                println!("Ignored {} malformed entries.", skipped);
            }
        }
        Event::Excluded { entry } => {
            println!(
                "Skipping {} (pass --include-sensitive to download it)",
                entry
            );
        }
        Event::Downloading { entry } => println!("Downloading {}...", entry),
        Event::Downloaded { path, .. } => println!("  saved {}", path.display()),
        Event::Failed { entry, error } => println!("  {} failed: {}", entry, error),
        Event::Cancelled { remaining } => {
            println!("Cancelled, {} titles not downloaded.", remaining)
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", summary);
    for (entry, error) in summary.failures() {
        println!("  {}: {}", entry, error);
    }
}

fn summary_exit_code(summary: &RunSummary) -> i32 {
    if summary.cancelled {
        EXIT_CANCELLED
    } else if summary.failed() > 0 {
        EXIT_PARTIAL
    } else {
        EXIT_OK
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
