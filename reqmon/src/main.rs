//! Entrypoint of the reqmon binary

use dotenvy::dotenv;
use reqmon_clap_blocks::logging::LoggingConfig;

mod commands {
    pub(crate) mod run;
}
mod logging;

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "reqmon",
    version,
    about = "Request lifecycle metrics engine",
    long_about = r#"Request lifecycle metrics engine

Examples:
    # Drive synthetic traffic through the engine and log the flushed samples
    reqmon run --application beachshirts --service styling -v

    # Emit samples as JSON lines for one minute, with a shard configured
    reqmon run --application beachshirts --service styling --shard primary --sink json --duration 1m

    # Configure the identity through the environment
    REQMON_APPLICATION=beachshirts REQMON_SERVICE=styling reqmon run
"#
)]
struct Config {
    #[clap(flatten)]
    logging_config: LoggingConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Run the engine against a synthetic request stream
    Run(commands::run::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tokio_runtime.block_on(async move {
        if let Err(e) = logging::init_logs(&config.logging_config) {
            eprintln!("Initializing logs failed: {e}");
            std::process::exit(ReturnCode::Failure as _);
        }

        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Run(config)) => {
                if let Err(e) = commands::run::command(config).await {
                    eprintln!("Run command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // Ignore this - a missing env file is not an error, defaults will
            // be applied when initialising the Config struct.
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}
