use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "filegate")]
#[command(about = "Event-triggered file validation and processing", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to $FILEGATE_CONFIG, then config/filegate.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP push endpoint
    Serve(ServeArgs),
    /// Handle a single trigger payload; exits 0 to ack, 75 to request redelivery
    Handle(HandleArgs),
    /// Check settings and rules, then print the effective settings
    Validate(ValidateArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to, overriding `server.bind_addr`
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct HandleArgs {
    /// Payload file; reads stdin when omitted or `-`
    pub payload: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Only check this rule document; needs no environment
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handle_with_global_config() {
        let cli = Cli::try_parse_from(["filegate", "handle", "event.json", "--config", "x.toml"])
            .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        match cli.command {
            Commands::Handle(args) => assert_eq!(args.payload, Some(PathBuf::from("event.json"))),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_serve_bind() {
        let cli = Cli::try_parse_from(["filegate", "serve", "--bind", "127.0.0.1:9000"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind, Some(SocketAddr::from(([127, 0, 0, 1], 9000))))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["filegate"]).is_err());
    }
}
