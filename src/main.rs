use tracing::{
    error,
    info,
};
use tracing_subscriber::EnvFilter;
use wortbot::{
    bot::Bot,
    config,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = config::config_path();
    let config = match config::load_config(&path) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %path.display(), %err, "could not load config");
            eprintln!("Copy config.json.example to {} and fill in your values.", path.display());
            std::process::exit(1);
        }
    };

    info!(path = %path.display(), "config loaded");

    let bot = match Bot::new(config) {
        Ok(bot) => bot,
        Err(err) => {
            error!(%err, "could not initialize bot");
            std::process::exit(1);
        }
    };

    if let Err(err) = bot.run().await {
        error!(%err, "bot stopped");
        std::process::exit(1);
    }
}
