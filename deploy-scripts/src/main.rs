use clap::Parser;
use deploy_scripts::{cli::Cli, errors::ScriptError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ScriptError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let Cli { env, command } = Cli::parse();
    command.run(env).await
}
