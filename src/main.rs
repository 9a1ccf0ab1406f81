//! Keywarden CLI entry point.

use clap::Parser;

use keywarden::cli::commands::CommandContext;
use keywarden::cli::{self, exit, Cli, Commands};
use keywarden::infrastructure::config::ConfigLoader;
use keywarden::infrastructure::logging::LoggerImpl;
use keywarden::infrastructure::setup::build_engine;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(i32::from(code));
}

async fn run(cli: Cli) -> u8 {
    let json = cli.json;

    if let Commands::Init(args) = &cli.command {
        return cli::commands::init::execute(args, json)
            .unwrap_or_else(|err| cli::handle_error(&err, json));
    }

    let config = match ConfigLoader::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            cli::handle_error(&err, json);
            return exit::FATAL;
        }
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => {
            cli::handle_error(&err, json);
            return exit::FATAL;
        }
    };

    let engine = match build_engine(&config).await {
        Ok(engine) => engine,
        Err(err) => {
            cli::handle_error(&err, json);
            return exit::FATAL;
        }
    };

    let ctx = CommandContext {
        engine,
        config,
        config_path: cli.config,
        json,
        actor: cli.actor,
    };

    match cli::dispatch(cli.command, &ctx).await {
        Ok(code) => code,
        Err(err) => cli::handle_error(&err, json),
    }
}
