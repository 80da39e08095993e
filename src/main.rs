use dogwatch::app::{self, Mode};
use dogwatch::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    app::init_tracing();

    tracing::info!("🚀 Starting golden dog watcher");

    let config = AppConfig::from_env()?;
    app::run(config, Mode::Full).await
}
