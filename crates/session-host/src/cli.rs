use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Default quiet period the console waits for output to settle after stdin closes.
pub const DEFAULT_DRAIN_MS: u64 = 50;

/// Command line of the `emu-session` host.
#[derive(Debug, Parser)]
#[command(name = "emu-session")]
#[command(about = "Drive an emulator session from the terminal")]
pub struct Cli {
    /// Log filter directive (for example `debug` or `session_core=trace`).
    ///
    /// Overrides `RUST_LOG`. Logs go to stderr.
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// `emu-session` subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a session, forward stdin as console input and print guest output.
    Run(RunArgs),
    /// Load a configuration without running it.
    Check(SourceArgs),
    /// Print the engine configuration rendered from a machine description.
    Render(RenderArgs),
}

/// Where the engine configuration comes from.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Engine configuration file.
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with = "machine",
        required_unless_present = "machine"
    )]
    pub config: Option<PathBuf>,

    /// JSON machine description to render into a temporary configuration.
    #[arg(long, value_name = "FILE")]
    pub machine: Option<PathBuf>,

    /// Directory image names in the description are resolved against.
    ///
    /// Defaults to the directory containing the description.
    #[arg(long, value_name = "DIR", requires = "machine")]
    pub base_dir: Option<PathBuf>,
}

/// Arguments of `emu-session run`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Configuration source.
    #[command(flatten)]
    pub source: SourceArgs,

    /// Quiet period, in milliseconds, output must stay idle after stdin closes
    /// before the session is stopped.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_DRAIN_MS)]
    pub drain_ms: u64,
}

/// Arguments of `emu-session render`.
#[derive(Debug, Clone, Args)]
pub struct RenderArgs {
    /// JSON machine description.
    #[arg(long, value_name = "FILE")]
    pub machine: PathBuf,

    /// Directory image names are resolved against.
    ///
    /// Defaults to the directory containing the description.
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;

    use super::{Cli, Command, DEFAULT_DRAIN_MS};

    #[test]
    fn run_accepts_config_file() {
        let cli = Cli::try_parse_from(["emu-session", "run", "--config", "temu.cfg"])
            .expect("valid command line");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.source.config.as_deref(), Some(Path::new("temu.cfg")));
        assert_eq!(args.drain_ms, DEFAULT_DRAIN_MS);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn log_level_is_global() {
        let cli = Cli::try_parse_from([
            "emu-session",
            "check",
            "--machine",
            "Machine.json",
            "--log-level",
            "debug",
        ])
        .expect("valid command line");
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Check(_)));
    }

    #[test]
    fn config_and_machine_are_mutually_exclusive() {
        assert!(Cli::try_parse_from([
            "emu-session",
            "check",
            "--config",
            "a.cfg",
            "--machine",
            "b.json",
        ])
        .is_err());
    }

    #[test]
    fn a_source_is_required() {
        assert!(Cli::try_parse_from(["emu-session", "run"]).is_err());
    }

    #[test]
    fn base_dir_requires_machine() {
        assert!(Cli::try_parse_from([
            "emu-session",
            "check",
            "--config",
            "a.cfg",
            "--base-dir",
            "/images",
        ])
        .is_err());
    }
}
