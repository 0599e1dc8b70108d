//! Pipeline kernel gRPC server — main entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Mutex;
use tonic::transport::Server;

use pipeline_kernel::grpc::{
    CommBusServiceImpl, EngineServiceImpl, KernelServiceImpl, OrchestrationServiceImpl,
    ToolServiceImpl,
};
use pipeline_kernel::kernel::Kernel;
use pipeline_kernel::proto::comm_bus_service_server::CommBusServiceServer;
use pipeline_kernel::proto::engine_service_server::EngineServiceServer;
use pipeline_kernel::proto::kernel_service_server::KernelServiceServer;
use pipeline_kernel::proto::orchestration_service_server::OrchestrationServiceServer;
use pipeline_kernel::proto::tool_service_server::ToolServiceServer;
use pipeline_kernel::Config;

/// Pipeline kernel: DAG-based agent pipeline orchestration over gRPC.
#[derive(Parser, Debug)]
#[command(name = "pipeline-kerneld")]
#[command(version)]
struct Cli {
    /// Address the gRPC server binds to.
    #[arg(long, env = "ADDR")]
    addr: Option<SocketAddr>,

    /// Grace period (seconds) to drain in-flight streams on shutdown.
    #[arg(long, env = "SHUTDOWN_GRACE_SECONDS")]
    shutdown_grace_seconds: Option<u64>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::default();
    pipeline_kernel::observability::init_tracing();

    let addr: SocketAddr = match cli.addr {
        Some(addr) => addr,
        None => config.server.listen_addr.parse()?,
    };
    let grace_period = cli
        .shutdown_grace_seconds
        .map(Duration::from_secs)
        .unwrap_or(config.server.shutdown_grace_period);

    let kernel = Arc::new(Mutex::new(Kernel::new()));

    let engine = EngineServiceServer::new(EngineServiceImpl::new(kernel.clone()));
    let kernel_svc = KernelServiceServer::new(KernelServiceImpl::new(kernel.clone()));
    let orchestration = OrchestrationServiceServer::new(OrchestrationServiceImpl::new(kernel.clone()));
    let commbus = CommBusServiceServer::new(CommBusServiceImpl::new(kernel.clone()));
    let tools = ToolServiceServer::new(ToolServiceImpl::new(kernel));

    tracing::info!(%addr, "pipeline kernel starting");

    Server::builder()
        .add_service(engine)
        .add_service(kernel_svc)
        .add_service(orchestration)
        .add_service(commbus)
        .add_service(tools)
        .serve_with_shutdown(addr, shutdown_signal(grace_period))
        .await?;

    Ok(())
}

/// Waits for SIGINT/SIGTERM, then gives in-flight streams a grace period
/// before the server actually unbinds.
async fn shutdown_signal(grace_period: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(grace_period_secs = grace_period.as_secs(), "shutdown signal received, draining in-flight streams");
}
