use clap::Parser;
use dotenv::dotenv;
use relay_console::cli::{ Args, RunMode };
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    let args = Args::parse();

    // console output shares the terminal with the log, keep it quiet there
    let default_level = match (args.debug, args.mode) {
        (true, _) => "debug",
        (false, RunMode::Console) => "warn",
        (false, RunMode::Serve) => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    relay_console::run(args).await
}
