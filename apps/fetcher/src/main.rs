mod config;
mod main_lib;

use config::Config;
use main_lib::{init_tracing, run_batch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let outcome = run_batch(&config).await?;

    // The failure report is the machine-readable result of the run.
    println!("{}", serde_json::to_string_pretty(&outcome.failures)?);
    Ok(())
}
