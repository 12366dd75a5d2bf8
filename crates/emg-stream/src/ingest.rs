//! Ingest coordinator: the single authoritative path from the sensing device
//!
//! One task owns the [`SignalChain`]. Device events and dashboard commands
//! reach it through mpsc queues, so filter state, posture baseline and
//! aggregation windows are only ever touched from that task.

use crate::config::StreamConfig;
use crate::hub::{BroadcastHub, Subscription};
use crate::messages::{DashboardMessage, DeviceState, HubStatus};
use crate::recorder::SessionRecorder;
use chrono::{DateTime, Utc};
use emg_core::{split_lines, EmgError, EmgResult, RecordKind};
use emg_processing::{FilterConfig, PostureBaseline, ProcessingConfig, SignalChain};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Event from the device connection task
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Connected { peer: String },
    /// One transport message; may hold several newline-separated lines
    Message(String),
    Disconnected,
}

/// Request to the coordinator, answered through a oneshot
#[derive(Debug)]
pub enum SessionCommand {
    UpdateFilter {
        config: FilterConfig,
        reply: oneshot::Sender<EmgResult<FilterConfig>>,
    },
    Calibrate {
        reply: oneshot::Sender<EmgResult<PostureBaseline>>,
    },
    Status {
        reply: oneshot::Sender<HubStatus>,
    },
    /// Register a dashboard with the current state already queued
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
}

/// Task state owning the signal chain
pub struct IngestCoordinator {
    chain: SignalChain,
    hub: Arc<BroadcastHub>,
    recorder: Arc<SessionRecorder>,
    config: StreamConfig,
    device_rx: mpsc::Receiver<DeviceEvent>,
    command_rx: mpsc::Receiver<SessionCommand>,
    device: DeviceState,
    peer: Option<String>,
    session_started: Option<DateTime<Utc>>,
    last_disconnect: Option<Instant>,
    last_raw_publish: Option<Instant>,
    orientation_available: bool,
}

impl IngestCoordinator {
    /// Run until every handle has been dropped
    pub async fn run(mut self) {
        info!(
            raw_interval_ms = self.config.raw_broadcast_interval_ms,
            resume_grace_secs = self.config.resume_grace_secs,
            "Ingest coordinator started"
        );

        loop {
            tokio::select! {
                // Device events drain first so a command sees every line sent before it
                biased;

                Some(event) = self.device_rx.recv() => self.handle_device_event(event),

                Some(command) = self.command_rx.recv() => self.handle_command(command),

                else => break,
            }
        }

        info!("Ingest coordinator stopped");
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected { peer } => self.on_connected(peer),
            DeviceEvent::Message(text) => self.on_message(&text),
            DeviceEvent::Disconnected => self.on_disconnected(),
        }
    }

    fn on_connected(&mut self, peer: String) {
        if self.device == DeviceState::Connected {
            warn!(peer = %peer, "Device connected without a prior disconnect; treating as reconnect");
            self.last_disconnect = Some(Instant::now());
        }

        let resume = self.session_started.is_some()
            && self
                .last_disconnect
                .map(|at| at.elapsed() < self.config.resume_grace())
                .unwrap_or(false);

        if resume {
            info!(peer = %peer, "Device reconnected within grace period, resuming session");
        } else {
            self.chain.reset_session();
            self.recorder.clear();
            self.orientation_available = false;
            self.session_started = Some(Utc::now());
            info!(peer = %peer, "Device connected, new session started");
        }

        self.device = DeviceState::Connected;
        self.peer = Some(peer.clone());
        self.last_raw_publish = None;

        self.hub.publish(DashboardMessage::device_status(DeviceState::Connected, Utc::now(), Some(peer)));
        self.hub.publish(DashboardMessage::MpuStatus {
            available: self.orientation_available,
        });
    }

    fn on_message(&mut self, text: &str) {
        if self.device != DeviceState::Connected {
            debug!("Dropping device data received while disconnected");
            return;
        }

        let received_at = Utc::now();
        for line in split_lines(text) {
            // Malformed lines are counted and logged by the chain
            if let Ok(records) = self.chain.process_line(line, received_at) {
                for record in records {
                    self.emit(record, received_at);
                }
            }
        }

        let available = self.chain.orientation_available();
        if available != self.orientation_available {
            self.orientation_available = available;
            info!(available, "Orientation availability changed");
            self.hub.publish(DashboardMessage::MpuStatus { available });
        }
    }

    /// Record then broadcast, preserving emission order
    fn emit(&mut self, record: RecordKind, received_at: DateTime<Utc>) {
        self.recorder.append(record, received_at);

        let message = match record {
            RecordKind::Sample(sample) => DashboardMessage::from_sample(&sample),
            RecordKind::Stats(window) => DashboardMessage::from_window(&window),
        };
        if message.is_raw_sample() && !self.raw_publish_due() {
            return;
        }
        self.hub.publish(message);
    }

    fn raw_publish_due(&mut self) -> bool {
        let now = Instant::now();
        let due = self
            .last_raw_publish
            .map(|at| now.duration_since(at) >= self.config.raw_broadcast_interval())
            .unwrap_or(true);
        if due {
            self.last_raw_publish = Some(now);
        }
        due
    }

    fn on_disconnected(&mut self) {
        if self.device == DeviceState::Disconnected {
            return;
        }

        self.device = DeviceState::Disconnected;
        self.last_disconnect = Some(Instant::now());
        let peer = self.peer.take();
        info!(
            peer = ?peer,
            recorded = self.recorder.len(),
            "Device disconnected, session kept"
        );

        self.hub.publish(DashboardMessage::device_status(DeviceState::Disconnected, Utc::now(), peer));
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::UpdateFilter { config, reply } => {
                let result = self.chain.update_filter(config).map(|_| self.chain.filter_config());
                if let Ok(applied) = &result {
                    self.hub.publish(DashboardMessage::FilterSettings(*applied));
                }
                let _ = reply.send(result);
            }
            SessionCommand::Calibrate { reply } => {
                let _ = reply.send(self.chain.calibrate(Utc::now()));
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            SessionCommand::Subscribe { reply } => {
                // Queued before any later publish, so the snapshot always arrives first
                let subscription = self.hub.subscribe();
                for message in self.initial_state() {
                    if let Err(e) = self.hub.send_to(subscription.id(), message) {
                        debug!("Initial state not queued: {}", e);
                    }
                }
                if reply.send(subscription).is_err() {
                    debug!("Dashboard left before its subscription was ready");
                }
            }
        }
    }

    /// Device, orientation and filter state for a new dashboard
    fn initial_state(&self) -> [DashboardMessage; 3] {
        [
            DashboardMessage::device_status(self.device, Utc::now(), self.peer.clone()),
            DashboardMessage::MpuStatus {
                available: self.orientation_available,
            },
            DashboardMessage::FilterSettings(self.chain.filter_config()),
        ]
    }

    fn status(&self) -> HubStatus {
        let span = self.recorder.span();
        HubStatus {
            device: self.device,
            device_peer: self.peer.clone(),
            session_started: self.session_started,
            counters: self.chain.counters(),
            subscribers: self.hub.subscriber_count(),
            recorded: self.recorder.len(),
            recorded_from: span.map(|(first, _)| first),
            recorded_to: span.map(|(_, last)| last),
            filter: self.chain.filter_config(),
            baseline: self.chain.baseline(),
            orientation_available: self.orientation_available,
        }
    }
}

/// Cloneable access to a running coordinator
#[derive(Clone)]
pub struct IngestHandle {
    device_tx: mpsc::Sender<DeviceEvent>,
    command_tx: mpsc::Sender<SessionCommand>,
    device_claimed: Arc<AtomicBool>,
    hub: Arc<BroadcastHub>,
    recorder: Arc<SessionRecorder>,
}

impl IngestHandle {
    /// Claim the single device slot; `None` while another device is attached
    pub fn try_claim_device(&self) -> Option<DeviceSession> {
        self.device_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        Some(DeviceSession {
            device_tx: self.device_tx.clone(),
            claimed: self.device_claimed.clone(),
            connected: false,
        })
    }

    /// Apply filter settings; returns the settings now in effect
    pub async fn update_filter(&self, config: FilterConfig) -> EmgResult<FilterConfig> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SessionCommand::UpdateFilter { config, reply }).await?;
        rx.await.map_err(|_| EmgError::DeviceDisconnected)?
    }

    pub async fn calibrate(&self) -> EmgResult<PostureBaseline> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SessionCommand::Calibrate { reply }).await?;
        rx.await.map_err(|_| EmgError::DeviceDisconnected)?
    }

    pub async fn status(&self) -> EmgResult<HubStatus> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SessionCommand::Status { reply }).await?;
        rx.await.map_err(|_| EmgError::DeviceDisconnected)
    }

    /// Register a dashboard whose queue starts with the current device,
    /// orientation and filter state, ahead of any broadcast data
    pub async fn subscribe(&self) -> EmgResult<Subscription> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SessionCommand::Subscribe { reply }).await?;
        rx.await.map_err(|_| EmgError::DeviceDisconnected)
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn recorder(&self) -> &Arc<SessionRecorder> {
        &self.recorder
    }

    async fn send_command(&self, command: SessionCommand) -> EmgResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| EmgError::DeviceDisconnected)
    }
}

/// Exclusive right to feed device data into the coordinator
///
/// Dropping the session releases the device slot and, if `close` was not
/// called, reports the disconnect on a best-effort basis.
pub struct DeviceSession {
    device_tx: mpsc::Sender<DeviceEvent>,
    claimed: Arc<AtomicBool>,
    connected: bool,
}

impl DeviceSession {
    pub async fn connect(&mut self, peer: impl Into<String>) -> EmgResult<()> {
        self.send(DeviceEvent::Connected { peer: peer.into() }).await?;
        self.connected = true;
        Ok(())
    }

    /// Forward one transport message (one or more lines)
    pub async fn send_message(&self, text: impl Into<String>) -> EmgResult<()> {
        self.send(DeviceEvent::Message(text.into())).await
    }

    /// Report the disconnect and release the device slot
    pub async fn close(mut self) {
        if self.connected {
            self.connected = false;
            let _ = self.send(DeviceEvent::Disconnected).await;
        }
    }

    async fn send(&self, event: DeviceEvent) -> EmgResult<()> {
        self.device_tx
            .send(event)
            .await
            .map_err(|_| EmgError::DeviceDisconnected)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.connected && self.device_tx.try_send(DeviceEvent::Disconnected).is_err() {
            warn!("Could not report device disconnect, coordinator queue full or closed");
        }
        self.claimed.store(false, Ordering::Release);
    }
}

/// Helper function to create the coordinator and start it in the background
pub fn start_ingest(processing: &ProcessingConfig, config: StreamConfig) -> EmgResult<IngestHandle> {
    config.validate()?;
    let chain = SignalChain::new(processing)?;

    let hub = BroadcastHub::new(config.subscriber_capacity);
    let recorder = Arc::new(SessionRecorder::new());
    let (device_tx, device_rx) = mpsc::channel(config.device_channel_capacity);
    let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity);

    let coordinator = IngestCoordinator {
        chain,
        hub: hub.clone(),
        recorder: recorder.clone(),
        config,
        device_rx,
        command_rx,
        device: DeviceState::Disconnected,
        peer: None,
        session_started: None,
        last_disconnect: None,
        last_raw_publish: None,
        orientation_available: false,
    };

    tokio::spawn(coordinator.run());

    Ok(IngestHandle {
        device_tx,
        command_tx,
        device_claimed: Arc::new(AtomicBool::new(false)),
        hub,
        recorder,
    })
}
