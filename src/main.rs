// src/main.rs

use devloop::{cli, config, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("devloop error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let settings = config::load_settings(args.config.as_deref(), &args.overrides())?;
    logging::init_logging(args.log_level, settings.debug)?;
    run(settings).await
}
