//! EMG Posture Hub server
//!
//! - Sensing device WebSocket (port 8081, `ESP32_PORT`)
//! - Dashboard WebSocket (port 8080, `WEB_CLIENT_PORT`)
//! - HTTP dashboard page, health, status and CSV export (port 8000, `HTTP_PORT`)

mod app;
mod dashboard;
mod device;
mod http;

use anyhow::Context;
use app::AppState;
use clap::Parser;
use emg_stream::{run_simulated_device, start_ingest, HubConfig, SimulatorConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "emg-server", about = "EMG posture hub: device ingest, dashboard fan-out and session export")]
struct Args {
    /// Dashboard WebSocket port
    #[arg(long, env = "WEB_CLIENT_PORT", default_value = "8080")]
    dashboard_port: u16,

    /// Sensing device WebSocket port
    #[arg(long, env = "ESP32_PORT", default_value = "8081")]
    device_port: u16,

    /// HTTP port for the dashboard page, health, status and export
    #[arg(long, env = "HTTP_PORT", default_value = "8000")]
    http_port: u16,

    /// JSON configuration file (processing and stream settings)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the dashboard page and its assets
    #[arg(long, env = "STATIC_DIR", value_name = "DIR", default_value = app::DEFAULT_STATIC_DIR)]
    static_dir: PathBuf,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Feed the hub from a simulated device instead of waiting for hardware
    #[arg(long)]
    simulate: bool,

    /// Seed for the simulated device
    #[arg(long, value_name = "SEED", requires = "simulate")]
    seed: Option<u64>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HubConfig> {
    let Some(path) = path else {
        return Ok(HubConfig::default());
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = HubConfig::from_json(&json)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Make sure the static directory exists so the HTTP server can start without a dashboard
fn prepare_static_dir(dir: &Path) {
    if dir.is_dir() {
        info!("Serving dashboard files from {}", dir.display());
        return;
    }
    warn!("Static directory {} not found, creating it", dir.display());
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Could not create static directory {}: {}", dir.display(), e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    if args.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let ingest = start_ingest(&config.processing, config.stream.clone())
        .context("Failed to start ingest coordinator")?;
    info!(
        sample_rate = config.processing.sample_rate,
        window = config.processing.stats_window_samples,
        window_secs = config.processing.stats_window_secs(),
        "Ingest coordinator running"
    );

    if args.simulate {
        let simulator = SimulatorConfig {
            sample_rate: config.processing.sample_rate,
            seed: args.seed,
            ..SimulatorConfig::default()
        };
        let handle = ingest.clone();
        tokio::spawn(async move {
            if let Err(e) = run_simulated_device(handle, simulator).await {
                warn!("Simulated device stopped: {}", e);
            }
        });
    }

    prepare_static_dir(&args.static_dir);
    let state = AppState::new(ingest).with_static_dir(args.static_dir.clone());

    let device_listener = app::bind("Device WebSocket", args.device_port).await?;
    let dashboard_listener = app::bind("Dashboard WebSocket", args.dashboard_port).await?;
    let http_listener = app::bind("HTTP", args.http_port).await?;

    let device_app = app::device_router(state.clone());
    tokio::spawn(async move {
        let service = device_app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(device_listener, service).await {
            error!("Device server failed: {}", e);
        }
    });

    let dashboard_app = app::dashboard_router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(dashboard_listener, dashboard_app).await {
            error!("Dashboard server failed: {}", e);
        }
    });

    axum::serve(http_listener, app::http_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    info!("EMG hub stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let args = Args::try_parse_from(["emg-server"]).unwrap();
        assert_eq!(args.dashboard_port, 8080);
        assert_eq!(args.device_port, 8081);
        assert_eq!(args.http_port, 8000);
        assert_eq!(args.static_dir, PathBuf::from("static"));
        assert!(!args.simulate);
        assert!(!args.print_config);
    }

    #[test]
    fn test_seed_requires_simulate() {
        assert!(Args::try_parse_from(["emg-server", "--seed", "3"]).is_err());
        let args = Args::try_parse_from(["emg-server", "--simulate", "--seed", "3"]).unwrap();
        assert_eq!(args.seed, Some(3));
    }

    #[test]
    fn test_load_config() {
        assert_eq!(load_config(None).unwrap(), HubConfig::default());
        assert!(load_config(Some(Path::new("/nonexistent/emg-hub.json"))).is_err());

        let path = std::env::temp_dir().join(format!("emg-hub-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"stream": {"subscriber_capacity": 64}}"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.stream.subscriber_capacity, 64);

        std::fs::write(&path, r#"{"processing": {"sample_rate": -1}}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_prepare_static_dir_creates_missing_directory() {
        let dir = std::env::temp_dir().join(format!("emg-hub-ui-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        prepare_static_dir(&dir);
        assert!(dir.is_dir());
        prepare_static_dir(&dir);
        assert!(dir.is_dir());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
