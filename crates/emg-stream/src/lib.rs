//! EMG-Stream: Ingest, distribution and recording for the EMG posture hub
//!
//! The ingest coordinator owns the signal chain and feeds the broadcast hub
//! and the session recorder. A simulated device can stand in for hardware.

pub mod config;
pub mod hub;
pub mod ingest;
pub mod messages;
pub mod recorder;
pub mod simulator;

pub use config::{HubConfig, StreamConfig};
pub use hub::{BroadcastHub, Subscription};
pub use ingest::{start_ingest, DeviceEvent, DeviceSession, IngestCoordinator, IngestHandle, SessionCommand};
pub use messages::{DashboardCommand, DashboardMessage, DeviceState, HubStatus};
pub use recorder::{render_csv, ExportRange, SessionRecorder, CSV_HEADER};
pub use simulator::{run_simulated_device, DeviceSimulator, SimulatorConfig};
