use clap::Parser;
use mixer_agent::{Target, Update, UpdateKind};
use mixer_runner::{Config, Error, RunResult, Runner};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mixer-runner")]
#[command(about = "Ask several web chat UIs the same question")]
#[command(version)]
struct Cli {
    /// Config file to run
    config: PathBuf,

    /// Question to ask; read one per line from stdin when omitted
    question: Option<String>,

    /// Only ask these targets (can be used multiple times)
    #[arg(short, long = "target", value_name = "TARGET")]
    targets: Vec<Target>,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Print one JSON object per update
    #[arg(long)]
    json: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> mixer_runner::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = Config::load(&cli.config)?;
    config.only(&cli.targets)?;

    if cli.check {
        let catalog = config.build_catalog();
        println!("Config valid: {}", config.name);
        println!("  Targets:");
        for target in &config.targets {
            let spec = catalog.get(*target);
            let note = if config.catalog.contains_key(target) {
                " (overridden)"
            } else {
                ""
            };
            println!(
                "    - {}: {} [{} input, {} button, {} response selectors]{}",
                target,
                spec.url,
                spec.input.len(),
                spec.button.len(),
                spec.response.len(),
                note
            );
        }
        println!("  Open missing tabs: {}", config.open_missing);
        println!(
            "  Polling: every {}ms, stable after {}, give up after {}",
            config.tuning.poll_interval_ms, config.tuning.stable_threshold, config.tuning.max_attempts
        );
        return Ok(());
    }

    // Override headless if specified
    if cli.headless {
        config.browser.headless = true;
    }

    if let Some(ref question) = cli.question {
        if question.trim().is_empty() {
            return Err(Error::EmptyQuestion);
        }
    }

    if !cli.json {
        println!("Running: {}", config.name);
    }

    let mut runner = Runner::new(&config.browser).await?;
    let mut any_failed_run = false;

    match cli.question {
        Some(ref question) => {
            let result = ask(&mut runner, &config, question, cli.json).await?;
            any_failed_run = result.all_failed();
        }
        None => {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match ask(&mut runner, &config, &line, cli.json).await {
                    Ok(result) => any_failed_run |= result.all_failed(),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        any_failed_run = true;
                    }
                }
            }
        }
    }

    runner.close().await?;

    if any_failed_run {
        std::process::exit(1);
    }

    Ok(())
}

/// Ask one question, printing updates while it runs.
async fn ask(
    runner: &mut Runner,
    config: &Config,
    question: &str,
    json: bool,
) -> mixer_runner::Result<RunResult> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = async {
        while let Some(update) = rx.recv().await {
            print_update(&update, json);
        }
    };
    let (result, ()) = tokio::join!(runner.ask(config, question, tx), printer);
    let result = result?;

    if !json {
        println!();
        println!(
            "  Answered: {}/{}",
            result.answered(),
            result.outcomes.len()
        );
        println!("  Duration: {}ms", result.duration_ms);
    }
    Ok(result)
}

fn print_update(update: &Update, json: bool) {
    if json {
        let line = match &update.kind {
            UpdateKind::Partial { text } => serde_json::json!({
                "target": update.target,
                "kind": "partial",
                "text": text,
            }),
            UpdateKind::Final { outcome } => serde_json::json!({
                "target": update.target,
                "kind": "final",
                "status": outcome.status(),
                "text": outcome.response_text(),
            }),
        };
        println!("{}", line);
        return;
    }

    match &update.kind {
        UpdateKind::Partial { text } => {
            println!("[{}] … {}", update.target, text);
        }
        UpdateKind::Final { outcome } => {
            let mark = if outcome.is_failure() { "✗" } else { "✓" };
            println!();
            println!("{} [{}] ({})", mark, update.target, outcome.status());
            println!("{}", outcome.response_text());
        }
    }
}
