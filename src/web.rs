use demografia::{Config, app};

/// Main entry point for the web application
///
/// Loads the configuration (defaults, `demografia.toml`, `DEMOGRAFIA_*`
/// environment variables), initialises logging and serves the dashboard.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    log::info!(
        "data from {}, charts to {}, users in {}",
        config.data_dir.display(),
        config.chart_dir.display(),
        config.users_file.display()
    );

    app::run(config).await
}
