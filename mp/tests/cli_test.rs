//! Command-line tests for the magic-prompt binary
//!
//! Every run gets its own config, data and home directories so the saved
//! state of the machine running the tests is never touched.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn magic_prompt(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("magic-prompt").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env_remove("MAGIC_PROMPT_DIR")
        .env_remove("GROQ_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_show_config_when_nothing_saved() {
    let home = TempDir::new().unwrap();
    magic_prompt(&home)
        .arg("--show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Config file:"))
        .stdout(predicate::str::contains("config.json"))
        .stdout(predicate::str::contains("No configuration saved."));
}

#[test]
fn test_save_dir_then_show_config() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();

    magic_prompt(&home)
        .arg("--save-dir")
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved working directory"));

    magic_prompt(&home)
        .arg("--show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("working_directory"))
        .stdout(predicate::str::contains("config.json"));
}

#[test]
fn test_save_dir_rejects_missing_directory() {
    let home = TempDir::new().unwrap();
    magic_prompt(&home)
        .arg("--save-dir")
        .arg(home.path().join("no-such-dir"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Not a directory"));
}

#[test]
fn test_debounce_is_clamped_and_saved() {
    let home = TempDir::new().unwrap();
    magic_prompt(&home)
        .args(["--debounce", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("100ms"));

    magic_prompt(&home)
        .arg("--show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"debounce_ms\": 100"));
}

#[test]
fn test_missing_api_key_fails_one_shot() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    magic_prompt(&home)
        .current_dir(project.path())
        .args(["-q", "add", "logging"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("GROQ_API_KEY"));
}

#[test]
fn test_help_lists_credentials() {
    let home = TempDir::new().unwrap();
    magic_prompt(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Credentials:"))
        .stdout(predicate::str::contains("--debounce"));
}

#[test]
fn test_interactive_mode_rejects_missing_directory() {
    let home = TempDir::new().unwrap();
    magic_prompt(&home)
        .arg("--tui")
        .arg("-d")
        .arg(home.path().join("missing"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Directory not found"));
}

#[test]
fn test_one_shot_rejects_missing_directory() {
    let home = TempDir::new().unwrap();
    magic_prompt(&home)
        .env("GROQ_API_KEY", "test-key")
        .arg("-d")
        .arg(home.path().join("missing"))
        .args(["-q", "add", "logging"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Directory not found"));
}

#[test]
fn test_dotenv_file_provides_api_key() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    std::fs::write(project.path().join(".env"), "GROQ_API_KEY=from-dotenv\n").unwrap();

    magic_prompt(&home)
        .current_dir(project.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("\u{2705} GROQ_API_KEY"));
}

#[test]
fn test_environment_wins_over_dotenv_file() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    std::fs::write(project.path().join(".env"), "GROQ_API_KEY=from-dotenv\n").unwrap();

    magic_prompt(&home)
        .current_dir(project.path())
        .env("GROQ_API_KEY", "")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("\u{274C} GROQ_API_KEY"));
}
