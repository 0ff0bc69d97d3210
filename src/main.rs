use mediagrab::api::{self, AppState};
use mediagrab::{Config, Downloader, FfmpegRemuxer, YtDlp};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.download_dir).await?;

    let downloader = Downloader::new(
        config.clone(),
        Box::new(YtDlp::new()),
        Box::new(FfmpegRemuxer::new()),
    );
    let state = Arc::new(AppState {
        downloader,
        config: config.clone(),
    });

    let app = api::router(state);

    let address: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Worker listening on {}", address);

    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
