//! Simple example of using ranked-proxy-pool.

use std::sync::Arc;

use ranked_proxy_pool::{
    RankedPool, RankerConfig, RotatingProxyMiddleware, RotationController,
};
use reqwest_middleware::ClientBuilder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Loading or building the ranked pool...");

    let config = RankerConfig::builder()
        .search_size(30)
        .rotation_size(10)
        .ranking_path("saved_free_proxies.json")
        .baseline_path("baseline_latencies.json")
        .build();

    let pool = RankedPool::load_or_rank(&config).await?;
    println!("Ranked {} proxies", pool.len());
    for entry in pool.best_n(10) {
        println!("  {} (score {:.3})", entry.proxy, entry.score);
    }

    let controller = Arc::new(RotationController::from_pool(
        &pool,
        config.rotation_size,
        config.max_requests_per_second,
    ));

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(RotatingProxyMiddleware::new(Arc::clone(&controller), &config))
        .build();

    println!("Sending request through the active proxy...");
    let response = client.get("https://httpbin.org/ip").send().await?;
    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    let rotation = controller.rotate(None).await?;
    println!("Rotated to {} (slot {})", rotation.entry.proxy, rotation.index);

    Ok(())
}
