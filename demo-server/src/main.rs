use clap::Parser;
use hub_demo_server::DemoServer;
use rmcp::{
    ServiceExt,
    transport::{
        StreamableHttpService, stdio, streamable_http_server::session::local::LocalSessionManager,
    },
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "hub-demo-server", version, about = "Sample MCP server for hub testing")]
struct Cli {
    /// Serve streamable HTTP under /mcp on this address instead of stdio
    #[arg(long)]
    http: Option<SocketAddr>,
}

async fn serve_http(addr: SocketAddr) -> anyhow::Result<()> {
    let service = StreamableHttpService::new(
        || Ok(DemoServer::new()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving streamable HTTP on /mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol in stdio mode
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("info,{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let cli = Cli::parse();
    match cli.http {
        Some(addr) => serve_http(addr).await,
        None => {
            tracing::info!("serving MCP over stdio");
            let service = DemoServer::new().serve(stdio()).await?;
            service.waiting().await?;
            Ok(())
        }
    }
}
