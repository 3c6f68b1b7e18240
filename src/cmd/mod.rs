//! One module per subcommand; [`dispatch`] picks the handler.

pub mod health;
pub mod init;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::CacheGateError;

const GETTING_STARTED: &str = "\
  No command provided. To get started:

    cachegate init                  Write a starter ./cachegate.yaml
    cachegate validate              Check it without starting anything
    cachegate run                   Serve it (auto-detects ./cachegate.yaml)
    cachegate health                Ask a running instance how its cache is doing
    cachegate --help                See all commands and options
";

pub async fn dispatch(cli: Cli) -> Result<(), CacheGateError> {
    let Some(command) = cli.command else {
        println!(
            "\n  cachegate v{}: caching reverse proxy\n\n{GETTING_STARTED}",
            env!("CARGO_PKG_VERSION")
        );
        return Ok(());
    };

    match command {
        Commands::Run(args) => run::execute(*args).await,
        Commands::Init(args) => init::execute(&args),
        Commands::Validate(args) => validate::execute(&args),
        Commands::Health(args) => health::execute(args).await,
    }
}
