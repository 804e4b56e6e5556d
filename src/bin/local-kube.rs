//! local-kube CLI - run the orchestrator's REST API

use clap::{Parser, Subcommand};
use local_kube::config::DEFAULT_API_PORT;
use local_kube::{
    DockerConfig, DockerDriver, OperatingSystem, Orchestrator, OrchestratorConfig, Registry,
    ServeConfig, Server, SqliteLogSink, TcpForwarder,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "local-kube")]
#[command(about = "Single-host orchestrator for containerized applications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind the API to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_API_PORT)]
        port: u16,
        /// Host application listeners bind to
        #[arg(long, default_value = "0.0.0.0")]
        listen_host: String,
        /// SQLite database for lifecycle logs
        #[arg(long, default_value = "local-kube.db")]
        db: PathBuf,
        /// Docker executable
        #[arg(long, default_value = "docker")]
        docker: String,
        /// Prefix for application image names
        #[arg(long, default_value = "")]
        image_prefix: String,
        /// Tag for application images
        #[arg(long, default_value = "latest")]
        image_tag: String,
        /// Deadline for each Docker or listener call, in seconds
        #[arg(long, default_value = "60")]
        call_timeout_secs: u64,
    },
    /// Show host settings used for container commands
    Info,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("local_kube=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            listen_host,
            db,
            docker,
            image_prefix,
            image_tag,
            call_timeout_secs,
        }) => {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let config = ServeConfig {
                addr,
                listen_host,
                db_path: db,
                orchestrator: OrchestratorConfig::new()
                    .call_timeout(Duration::from_secs(call_timeout_secs))
                    .reserve_port(port),
                docker: DockerConfig::new()
                    .binary(docker)
                    .image_prefix(image_prefix)
                    .image_tag(image_tag),
            };
            cmd_serve(config).await?;
        }
        Some(Commands::Info) | None => cmd_info(),
    }

    Ok(())
}

async fn cmd_serve(config: ServeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let os = OperatingSystem::current();
    let sink = Arc::new(SqliteLogSink::open(&config.db_path)?);
    let driver = Arc::new(DockerDriver::new(config.docker.clone(), os));
    let listeners = Arc::new(TcpForwarder::new(
        tokio::runtime::Handle::current(),
        config.listen_host.clone(),
    ));

    let orch = Arc::new(
        Orchestrator::new(Arc::new(Registry::new()), driver, listeners)
            .with_log_sink(sink)
            .with_config(config.orchestrator.clone())?,
    );

    println!("Starting API server on http://{}", config.addr);
    println!();
    println!("Endpoints:");
    println!("  GET  /health        Health check");
    println!("  POST /app/start     Start an application {{\"app\": \"<name>:<port>\"}}");
    println!("  POST /app/stop      Stop an application {{\"id\": <id>}}");
    println!("  GET  /app/list      List running applications");
    println!("  GET  /logs/:id      Lifecycle events of an application");
    println!();

    Server::new(Arc::clone(&orch), config.addr)
        .run(shutdown_signal())
        .await?;

    tracing::info!("API server stopped, removing applications");
    let errors = tokio::task::spawn_blocking(move || orch.shutdown()).await?;
    for e in &errors {
        tracing::error!(error = %e, "Cleanup failed");
    }
    if !errors.is_empty() {
        return Err(format!("{} application(s) not cleaned up", errors.len()).into());
    }

    Ok(())
}

fn cmd_info() {
    let os = OperatingSystem::current();
    let docker = DockerConfig::default();

    println!("=== local-kube ===\n");
    println!("[*] Host:");
    println!("    OS:          {}", os);
    println!("    Shell:       {} {}", os.shell(), os.option());
    println!("    Separator:   {}", os.separator());
    if !os.host_option().is_empty() {
        println!("    Host option: {}", os.host_option());
    }
    println!("\n[*] Docker:");
    println!("    Binary:      {}", docker.binary);
    println!("    Image:       {}", docker.image_for("<name>"));
    println!("\n[*] Usage:");
    println!("    local-kube serve [--port <port>] [--db <path>] [--image-prefix <prefix>]");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
