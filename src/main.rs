use clap::Parser;
use dotenvy::dotenv;
use qr_drop::config::{AppConfig, parse_base_url};
use qr_drop::services::storage::{LocalStorageService, StorageService};
use qr_drop::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory uploaded files are stored in (overrides UPLOAD_DIR)
    #[arg(short, long)]
    upload_dir: Option<PathBuf>,

    /// Base URL embedded in QR codes, e.g. http://192.168.1.11:5000 (overrides PUBLIC_BASE_URL)
    #[arg(long)]
    public_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qr_drop=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting QR drop...");

    // 2. Configuration
    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.upload_dir {
        config.upload_dir = dir;
    }
    if let Some(raw) = args.public_base_url {
        config.public_base_url = parse_base_url(&raw)
            .ok_or_else(|| anyhow::anyhow!("Invalid --public-base-url: {}", raw))?;
    }

    info!(
        "🛡️  Config: Upload Dir={:?}, Max Size={}MB, Allowed={}, Links={}",
        config.upload_dir,
        config.max_file_size / 1024 / 1024,
        config.allowed_extensions.join(","),
        config.public_base_url
    );

    // 3. Storage
    let storage = Arc::new(LocalStorageService::new(config.upload_dir.clone()));
    storage.ensure_root().await?;

    // 4. HTTP server
    let state = AppState::new(storage, config.clone());

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);

    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("✅ Server ready at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
