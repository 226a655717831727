use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::stream::{self, StreamCliArgs, StreamConfig};

/// Annotated QR code camera stream.
#[derive(Debug, Parser)]
#[command(name = "codecam", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture from the camera and serve annotated frames at GET /stream.
    Stream(StreamCliArgs),
}

pub fn handle_commands(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Stream(args) => {
            let config = StreamConfig::try_from(args)?;
            stream::run(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_subcommand_parses() {
        let cli = Cli::try_parse_from(["codecam", "stream", "--port", "8081"]).unwrap();
        let Command::Stream(args) = cli.command;
        assert_eq!(args.port, 8081);
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["codecam"]).is_err());
    }
}
