//! # Command-Line Interface Module
//!
//! Argument parsing for the broker binary, using `clap`'s derive API.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// An in-memory, multi-queue message broker speaking a line-oriented TCP protocol.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// TCP port to listen on.
    #[arg(short = 'p', long, default_value_t = crate::defaults::PORT)]
    pub port: u16,

    /// Address to bind to. Use "127.0.0.1" to restrict to loopback.
    #[arg(long, default_value = crate::defaults::HOST)]
    pub host: String,

    /// Write detailed logs to this file instead of the default rolling log.
    /// Pass "stderr" to send detailed logs to stderr instead of a file.
    #[arg(long)]
    pub log_file: Option<String>,

    /// Suppress the colorized, human-facing log layer on stdout.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Increase log verbosity. Repeatable: -v for debug, -vv for trace.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Port 0 asks the OS to pick an ephemeral port, which is never what a
    /// broker meant to be reached at a stable address wants. `u16` already
    /// rules out anything above 65535, so this is the one bound clap's type
    /// system can't express.
    pub fn validate_port(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn defaults_match_spec() {
        let args = Args::parse_from(["queue-broker"]);
        assert_eq!(args.port, 7878);
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.log_file, None);
        assert!(!args.quiet);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn verbose_is_repeatable() {
        let args = Args::parse_from(["queue-broker", "-vv"]);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn port_and_host_are_overridable() {
        let args = Args::parse_from(["queue-broker", "--port", "9000", "--host", "127.0.0.1"]);
        assert_eq!(args.port, 9000);
        assert_eq!(args.host, "127.0.0.1");
    }

    #[test]
    fn verify_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn port_zero_is_rejected() {
        let args = Args::parse_from(["queue-broker", "--port", "0"]);
        assert!(args.validate_port().is_err());
    }

    #[test]
    fn default_port_is_valid() {
        let args = Args::parse_from(["queue-broker"]);
        assert!(args.validate_port().is_ok());
    }
}
