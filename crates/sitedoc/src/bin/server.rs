//! Document server binary
//!
//! Run with: cargo run -p sitedoc --bin sitedoc-server

use sitedoc::{config::AppConfig, server::SitedocServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitedoc=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                         sitedoc                           ║
║      Construction Document Storage, Splitting & Review    ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    let config = AppConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Upload directory: {}", config.storage.upload_dir.display());
    tracing::info!("  - Max upload size: {} bytes", config.server.max_upload_size);
    tracing::info!(
        "  - Retention: {} (max age {}s, every {}s)",
        if config.retention.enabled { "on" } else { "off" },
        config.retention.max_age_secs,
        config.retention.interval_secs
    );
    tracing::info!("  - Default pages per file: {}", config.splitter.default_pages_per_file);
    match &config.splitter.script {
        Some(script) => tracing::info!("  - Split backend: script {}", script.display()),
        None => tracing::info!("  - Split backend: native"),
    }
    tracing::info!("  - DeepSeek model: {}", config.deepseek.model);

    let server = SitedocServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/files/upload      - Upload a file");
    println!("  POST /api/files/split-docx  - Split a DOCX by pages");
    println!("  POST /api/analyze/:id       - AI review of a file");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
