//! Entry point for the procsnap collector. Opens the store and serves the HTTP API.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use procsnap::{router, AppState, ServerConfig, Store};

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--port PORT|-p PORT]\n\
         Environment: PROCSNAP_API_KEY, PROCSNAP_DB, PROCSNAP_PORT"
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        let prog = args.first().map(String::as_str).unwrap_or("procsnap");
        println!("{}", usage(prog));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = ServerConfig::from_env().with_args(args);
    if cfg.uses_default_key() {
        warn!("PROCSNAP_API_KEY not set; accepting the built-in development key");
    }

    let store = Arc::new(Store::open(&cfg.db_path)?);
    let app = router(AppState::new(store, &cfg.api_key));

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("collector listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
