use clap::Parser;
use scp_backend::{
    config::{Cli, Command, read_config_file},
    serve_dev_app, serve_prod_app,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().unwrap_or_default();
    let Cli { command } = Cli::parse();

    match command {
        Command::Dev { host, port } => serve_dev_app(host, port).await?,
        Command::Prod {
            config,
            log_dir,
            config_file,
        } => {
            let config = match config_file {
                Some(path) => read_config_file(&path)?,
                None => config,
            };

            serve_prod_app(config, Some(log_dir)).await?;
        }
    }

    Ok(())
}
