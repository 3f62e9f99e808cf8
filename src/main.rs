// 使用库 crate
use chunker_service_rs::api::start_server;
use chunker_service_rs::config::{ServiceConfig, DEV_CHUNKER_SECRET};

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    println!("🚀 Chunker Service - 启动中...\n");

    let config = ServiceConfig::from_env();

    if config.idp.is_none() && config.chunker_secret == DEV_CHUNKER_SECRET {
        tracing::warn!("No CHUNKER_SECRET set! Using insecure dev default (local testing only)");
    }

    println!("📊 配置加载完成:");
    println!("   port             = {}", config.port);
    println!("   max_chunk_size   = {}", config.default_max_chunk_size);
    println!(
        "   token verifier   = {}",
        if config.idp.is_some() {
            "IdP (RS256)"
        } else {
            "local HS256"
        }
    );
    println!();

    start_server(config).await?;

    Ok(())
}
