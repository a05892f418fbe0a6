//! Magic Prompt - CLI entry point
//!
//! One-shot enrichment of a prompt given as arguments or on stdin, or the
//! real-time TUI when no prompt is given.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use magicprompt::cli::{Cli, Mode, generate_after_help, get_log_path, read_piped_stdin};
use magicprompt::config::Config;
use magicprompt::display::StdoutDisplay;
use magicprompt::llm::create_client;
use magicprompt::orchestrator::{DEFAULT_DEBOUNCE_MS, enrich_once};
use magicprompt::output::{ClipboardOutput, NullOutput, OutputError, OutputSink};
use magicprompt::progress::{LogSink, NullSink, StderrSink};
use magicprompt::prompts::PromptComposer;
use magicprompt::scanner;
use magicprompt::store::{ConfigStore, resolve_working_directory};
use magicprompt::tui::{self, TuiParams};

/// Exit status after Ctrl-C, as a shell reports SIGINT
const EXIT_INTERRUPTED: u8 = 130;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Variables already in the environment win over the .env file
    let dotenv_path = dotenvy::dotenv().ok();

    // Build command with dynamic after_help that shows credential status
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = match Cli::from_arg_matches(&cmd.get_matches()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    match run(cli, dotenv_path).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, dotenv_path: Option<PathBuf>) -> Result<ExitCode> {
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;
    if let Some(path) = &dotenv_path {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "magic-prompt loaded config");

    let mut store = ConfigStore::open_default();

    if let Some(ms) = cli.debounce {
        let Some(store) = store.as_mut() else {
            eyre::bail!("Cannot locate a config directory to save the debounce interval");
        };
        let saved = store.set_debounce_ms(ms)?;
        println!("{} Debounce interval set to {}ms", "✓".green(), saved);
    }

    let mode = cli.mode(read_piped_stdin);
    debug!(?mode, "main: dispatching mode");
    match mode {
        Mode::ShowConfig => cmd_show_config(store.as_ref()),
        Mode::SaveDir(dir) => cmd_save_dir(store.as_mut(), &dir),
        Mode::DebounceOnly => Ok(ExitCode::SUCCESS),
        Mode::Interactive => {
            let root = resolve_working_directory(cli.directory.as_deref(), store.as_ref());
            let debounce_ms = store.as_ref().map_or(DEFAULT_DEBOUNCE_MS, ConfigStore::debounce_ms);
            let debounce = Duration::from_millis(debounce_ms);
            cmd_tui(&config, root, debounce).await
        }
        Mode::OneShot(prompt) => {
            let root = resolve_working_directory(cli.directory.as_deref(), store.as_ref());
            cmd_enrich(&config, root, &prompt, cli.quiet).await
        }
    }
}

fn cmd_show_config(store: Option<&ConfigStore>) -> Result<ExitCode> {
    debug!("cmd_show_config: called");
    let Some(store) = store else {
        eyre::bail!("Cannot locate a config directory");
    };
    println!("Config file: {}", store.path().display());
    if store.is_empty() {
        println!("No configuration saved.");
    } else {
        println!("{}", store.to_pretty_json());
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_save_dir(store: Option<&mut ConfigStore>, dir: &Path) -> Result<ExitCode> {
    debug!(dir = %dir.display(), "cmd_save_dir: called");
    let Some(store) = store else {
        eyre::bail!("Cannot locate a config directory to save to");
    };
    match store.save_directory(dir) {
        Ok(saved) => {
            println!("{} Saved working directory: {}", "✓".green(), saved.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Clipboard export that reports the copy on stderr
struct AnnouncedClipboard(ClipboardOutput);

impl OutputSink for AnnouncedClipboard {
    fn export(&self, text: &str) -> Result<(), OutputError> {
        self.0.export(text)?;
        eprintln!("\n{} Copied to clipboard", "✓".green());
        Ok(())
    }
}

async fn cmd_enrich(config: &Config, root: PathBuf, prompt: &str, quiet: bool) -> Result<ExitCode> {
    debug!(root = %root.display(), quiet, "cmd_enrich: called");
    let root = scanner::check_root(&root)?;
    config.validate()?;
    let client = create_client(&config.llm)?;

    if !quiet {
        eprintln!("Scanning project: {}", root.display());
    }
    let log: Box<dyn LogSink> = if quiet { Box::new(NullSink) } else { Box::new(StderrSink) };
    let ignore = config.scan.ignore_rules();
    let limits = config.scan.limits();
    let scan_root = root.clone();
    let context = tokio::task::spawn_blocking(move || scanner::scan(&scan_root, &ignore, &limits, log.as_ref()))
        .await
        .context("Scanner task failed")??;
    if !quiet {
        eprintln!(
            "{} Found {} files, {} signatures{}\n",
            "✓".green(),
            context.total_files(),
            context.signatures().len(),
            if context.truncated() { " (truncated)" } else { "" }
        );
    }

    let composer = Arc::new(PromptComposer::load(context.root_path())?);
    let output: Arc<dyn OutputSink> = if quiet {
        Arc::new(NullOutput)
    } else {
        Arc::new(AnnouncedClipboard(ClipboardOutput::new()))
    };
    let enrichment = enrich_once(
        client,
        composer,
        Arc::new(context),
        config.llm.session_options(),
        prompt,
        Arc::new(StdoutDisplay::new(quiet)),
        output,
    );

    tokio::select! {
        result = enrichment => match result {
            Ok(text) => {
                info!(len = text.len(), "cmd_enrich: completed");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                warn!(kind = %e.kind, error = %e.message, "cmd_enrich: failed");
                Ok(ExitCode::FAILURE)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("cmd_enrich: interrupted");
            eprintln!("\nCancelled.");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}

async fn cmd_tui(config: &Config, root: PathBuf, debounce: Duration) -> Result<ExitCode> {
    debug!(root = %root.display(), ?debounce, "cmd_tui: called");
    let root = scanner::check_root(&root)?;
    config.validate()?;
    let client = create_client(&config.llm)?;
    let composer = Arc::new(PromptComposer::load(&root)?);

    tui::run(TuiParams {
        client,
        composer,
        root,
        scan: config.scan.clone(),
        options: config.llm.session_options(),
        debounce,
    })
    .await?;
    Ok(ExitCode::SUCCESS)
}
