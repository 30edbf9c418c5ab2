//! CLI command definitions for the `voltura` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod session;
pub mod tasks;

use clap::{Parser, Subcommand};

/// Voltura Service Hub: chat concierge, workflows and point of sale.
#[derive(Parser)]
#[command(name = "voltura", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for debug, -vv for trace). Overrides the configured level.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server (and the workflow workers unless disabled).
    Serve {
        /// Port to listen on (defaults to `server.port` in config.toml).
        #[arg(long, short)]
        port: Option<u16>,

        /// Host to bind to (defaults to `server.host` in config.toml).
        #[arg(long)]
        host: Option<String>,

        /// Serve HTTP only; run the workers in a separate `voltura worker` process.
        #[arg(long)]
        no_workers: bool,
    },

    /// Run the workflow workers without the HTTP server.
    Worker,

    /// Inspect and control chat sessions.
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Inspect workflow tasks.
    Tasks {
        #[command(subcommand)]
        action: TasksCommand,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Show a session's status and pairing code, if any.
    Status {
        /// Session id.
        id: String,
    },

    /// Connect a session and wait until it is paired and open.
    Connect {
        /// Session id.
        id: String,
    },

    /// Close a session and mark it disconnected.
    Terminate {
        /// Session id.
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TasksCommand {
    /// List tasks that failed permanently or ran out of attempts.
    Failed {
        /// Maximum number of tasks to show.
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

/// Log filter for `-v` flags, if any were given.
pub fn verbosity_filter(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info,voltura=debug"),
        _ => Some("trace"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from(["voltura", "serve", "--port", "8080", "--no-workers"]).unwrap();
        match cli.command {
            Commands::Serve {
                port,
                host,
                no_workers,
            } => {
                assert_eq!(port, Some(8080));
                assert!(host.is_none());
                assert!(no_workers);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_session_terminate() {
        let cli = Cli::try_parse_from(["voltura", "-v", "--json", "session", "terminate", "shop"]).unwrap();
        assert!(cli.json);
        assert_eq!(verbosity_filter(cli.verbose), Some("info,voltura=debug"));
        assert!(matches!(
            cli.command,
            Commands::Session {
                action: SessionCommand::Terminate { ref id }
            } if id == "shop"
        ));
    }
}
