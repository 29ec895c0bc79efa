mod cli;

use clap::Parser;
use cli::{Cli, Commands, HandleArgs, ValidateArgs};
use filegate::api::{self, AppState};
use filegate::config::{RuleSet, RuleSource, Settings};
use filegate::observability;
use filegate::processors::ProcessorRegistry;
use std::path::Path;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// `EX_TEMPFAIL`: the event should be delivered again
const EXIT_RETRY: u8 = 75;

#[tokio::main]
async fn main() -> ExitCode {
    observability::init_tracing();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let outcome = match cli.command {
        Commands::Serve(args) => serve(config, args.bind).await,
        Commands::Handle(args) => handle(config, args).await,
        Commands::Validate(args) => validate(config, args),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "filegate failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(
    config: Option<&Path>,
    bind: Option<std::net::SocketAddr>,
) -> Result<ExitCode, AnyError> {
    let mut settings = Settings::load(config)?;
    if let Some(bind) = bind {
        settings.server.bind_addr = bind;
    }

    api::run(settings).await?;
    Ok(ExitCode::SUCCESS)
}

async fn handle(config: Option<&Path>, args: HandleArgs) -> Result<ExitCode, AnyError> {
    let settings = Settings::load(config)?;
    let state = AppState::from_settings(&settings)?;

    let payload = match args.payload.as_deref() {
        Some(path) if path != Path::new("-") => tokio::fs::read(path).await?,
        _ => {
            let mut buffer = Vec::new();
            tokio::io::stdin().read_to_end(&mut buffer).await?;
            buffer
        }
    };

    let result = state.handler.handle(&payload).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(if result.is_retryable() {
        ExitCode::from(EXIT_RETRY)
    } else {
        ExitCode::SUCCESS
    })
}

fn validate(config: Option<&Path>, args: ValidateArgs) -> Result<ExitCode, AnyError> {
    let registry = ProcessorRegistry::with_defaults();

    if let Some(path) = args.rules {
        let source = RuleSource::File(path);
        let rules = RuleSet::load(&source, &registry)?;
        for (file_type, rule) in rules.iter() {
            println!(
                "{file_type}\t{}\t{}\t{}{}",
                rule.transform_id,
                rule.max_size_bytes,
                rule.output_suffix,
                if rule.enabled { "" } else { "\t(disabled)" }
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let settings = Settings::load(config)?;
    let rules = RuleSet::load(&RuleSource::from_settings(&settings), &registry)?;
    tracing::info!(rules = rules.len(), "Configuration is valid");

    print!("{}", toml::to_string_pretty(&settings)?);
    Ok(ExitCode::SUCCESS)
}
