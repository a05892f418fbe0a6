//! CLI definition

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use crate::config::Config;
use crate::store::ConfigStore;

/// Magic Prompt - enrich a short prompt with context from your project
#[derive(Debug, Parser)]
#[command(
    name = "magic-prompt",
    about = "Enrich a short prompt with context from a local project, streamed from an LLM",
    version
)]
pub struct Cli {
    /// Prompt to enrich (words are joined with spaces; read from stdin when piped)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,

    /// Project directory to scan
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Save a default project directory and exit
    #[arg(long = "save-dir", value_name = "DIR")]
    pub save_dir: Option<PathBuf>,

    /// Show the saved configuration and exit
    #[arg(long = "show-config")]
    pub show_config: bool,

    /// Launch the interactive real-time mode
    #[arg(short, long)]
    pub tui: bool,

    /// Print only the enriched prompt (no progress, no clipboard)
    #[arg(short, long)]
    pub quiet: bool,

    /// Save the real-time debounce interval in milliseconds (100-5000)
    #[arg(long, value_name = "MS")]
    pub debounce: Option<u64>,

    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,
}

/// What the invocation asks for, after flags and stdin are considered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    ShowConfig,
    SaveDir(PathBuf),
    /// Only persist the debounce interval
    DebounceOnly,
    Interactive,
    OneShot(String),
}

impl Cli {
    /// Prompt words joined with spaces, if any were given
    pub fn prompt_text(&self) -> Option<String> {
        let joined = self.prompt.join(" ");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Decide the run mode; `stdin_prompt` is consulted only when no prompt
    /// words were given and no other mode was selected
    pub fn mode<F>(&self, stdin_prompt: F) -> Mode
    where
        F: FnOnce() -> Option<String>,
    {
        debug!(?self, "Cli::mode: called");
        if self.show_config {
            return Mode::ShowConfig;
        }
        if let Some(dir) = &self.save_dir {
            return Mode::SaveDir(dir.clone());
        }
        if self.tui {
            return Mode::Interactive;
        }
        if let Some(prompt) = self.prompt_text() {
            return Mode::OneShot(prompt);
        }
        if self.debounce.is_some() {
            return Mode::DebounceOnly;
        }
        match stdin_prompt() {
            Some(prompt) => Mode::OneShot(prompt),
            None => Mode::Interactive,
        }
    }
}

/// Read a prompt from stdin when it is piped
pub fn read_piped_stdin() -> Option<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        debug!("read_piped_stdin: stdin is a terminal");
        return None;
    }
    let text = std::io::read_to_string(stdin).ok()?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("magic-prompt")
        .join("logs")
        .join("magic-prompt.log")
}

/// Generate the after_help text with file locations and credential status
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let config = Config::default();
    let key_env = config.llm.api_key_env();
    let key_icon = if config.llm.api_key().is_ok() {
        "\u{2705}"
    } else {
        "\u{274C}"
    };

    let mut help = String::new();
    help.push_str("Credentials:\n");
    help.push_str(&format!("  {} {}\n", key_icon, key_env));

    help.push('\n');
    help.push_str("Files:\n");
    if let Some(store) = ConfigStore::default_path() {
        help.push_str(&format!("  saved state: {}\n", store.display()));
    }
    if let Some(dir) = dirs::config_dir() {
        help.push_str(&format!(
            "  config:      {}\n",
            dir.join("magic-prompt").join("magic-prompt.yml").display()
        ));
    }
    help.push_str(&format!("  logs:        {}\n", get_log_path().display()));
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("magic-prompt").chain(args.iter().copied())).unwrap()
    }

    fn no_stdin() -> Option<String> {
        None
    }

    #[test]
    fn test_prompt_words_joined() {
        let cli = parse(&["add", "user", "auth"]);
        assert_eq!(cli.mode(no_stdin), Mode::OneShot("add user auth".to_string()));
    }

    #[test]
    fn test_no_prompt_is_interactive() {
        assert_eq!(parse(&[]).mode(no_stdin), Mode::Interactive);
    }

    #[test]
    fn test_piped_stdin_is_one_shot() {
        let mode = parse(&["-q"]).mode(|| Some("from pipe".to_string()));
        assert_eq!(mode, Mode::OneShot("from pipe".to_string()));
    }

    #[test]
    fn test_tui_flag_wins_over_prompt() {
        let cli = parse(&["-t", "ignored"]);
        assert_eq!(cli.mode(|| panic!("stdin must not be read")), Mode::Interactive);
    }

    #[test]
    fn test_debounce_alone_only_saves() {
        let cli = parse(&["--debounce", "300"]);
        assert_eq!(cli.debounce, Some(300));
        assert_eq!(cli.mode(|| panic!("stdin must not be read")), Mode::DebounceOnly);
    }

    #[test]
    fn test_debounce_with_prompt_runs_prompt() {
        let cli = parse(&["--debounce", "300", "fix", "bug"]);
        assert_eq!(cli.mode(no_stdin), Mode::OneShot("fix bug".to_string()));
    }

    #[test]
    fn test_show_config_and_save_dir() {
        assert_eq!(parse(&["--show-config"]).mode(no_stdin), Mode::ShowConfig);
        assert_eq!(
            parse(&["--save-dir", "/tmp/x"]).mode(no_stdin),
            Mode::SaveDir(PathBuf::from("/tmp/x"))
        );
    }

    #[test]
    fn test_directory_and_logging_flags() {
        let cli = parse(&["-d", "/src/app", "-l", "debug", "-c", "mp.yml", "hello"]);
        assert_eq!(cli.directory, Some(PathBuf::from("/src/app")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("mp.yml")));
    }

    #[test]
    fn test_blank_prompt_words_fall_back_to_stdin() {
        let cli = parse(&["  "]);
        assert_eq!(cli.prompt_text(), None);
        assert_eq!(cli.mode(|| Some("piped".to_string())), Mode::OneShot("piped".to_string()));
    }
}
