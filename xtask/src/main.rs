use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(name = "cargo-xtask", version, about = "Project automation tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Format Rust sources
    Fmt,
    /// Run rustfmt and clippy checks
    Check,
    /// Run the test suite
    Test,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_root = project_root()?;
    let shell = Shell::new()?;
    let _dir = shell.push_dir(project_root);

    match cli.command {
        Command::Fmt => run_fmt(&shell),
        Command::Check => run_check(&shell),
        Command::Test => run_test(&shell),
    }
}

fn run_fmt(shell: &Shell) -> Result<()> {
    cmd!(shell, "cargo fmt --all")
        .run()
        .context("failed to run cargo fmt")?;
    Ok(())
}

fn run_check(shell: &Shell) -> Result<()> {
    cmd!(shell, "cargo fmt --all -- --check")
        .run()
        .context("cargo fmt --check failed")?;
    cmd!(
        shell,
        "cargo clippy --workspace --all-targets --all-features -- -D warnings"
    )
    .run()
    .context("cargo clippy failed")?;
    Ok(())
}

fn run_test(shell: &Shell) -> Result<()> {
    cmd!(shell, "cargo test --workspace")
        .run()
        .context("cargo test failed")?;
    Ok(())
}

fn project_root() -> Result<PathBuf> {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(PathBuf::from)
        .context("xtask has no parent directory")
}
