use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = relay_server::config::config();
    let snapshot = cfg.snapshot();
    let host = snapshot.get("http.host").unwrap_or("127.0.0.1").to_string();
    let port = snapshot.get("http.port").unwrap_or("3040").to_string();

    let ax = relay_server::build(cfg).await?;

    let addr = format!("{host}:{port}");
    println!("[relay] listening on http://{addr}");

    ax.listen(addr).await?;

    Ok(())
}

/// `RUST_LOG` filter (default `info`); `RELAY_LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RELAY_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
