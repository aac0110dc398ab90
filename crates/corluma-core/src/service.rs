// ── Discovery service ──
//
// Async driver around `DiscoveryEngine`. One task per protocol family
// owns its engine and handles one event at a time: commands from
// handles, timer ticks, SSDP packets, probe results and the end of the
// startup grace. Probes run as independent tasks and report back over a
// channel, so a slow device never blocks the loop.

use std::sync::Arc;

use corluma_api::{HttpProbe, PacketBus, ProbeOutcome, ProbeRequest, ProtocolFamily, SsdpListener, SsdpPacket};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DiscoveryConfig, NetworkConfig};
use crate::discovery::{DiscoveryEngine, DiscoverySnapshot};
use crate::error::CoreError;
use crate::model::{ConnectionRecord, DiscoveryState};

const COMMAND_CHANNEL_SIZE: usize = 32;
const PROBE_CHANNEL_SIZE: usize = 128;

// ── Commands ─────────────────────────────────────────────────────────

enum ServiceCommand {
    Start,
    Stop,
    AddManualIp {
        ip: String,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        key: String,
        reply: oneshot::Sender<Option<ConnectionRecord>>,
    },
    Rename {
        key: String,
        name: String,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<DiscoverySnapshot>,
    },
}

// ── DiscoveryHandle ──────────────────────────────────────────────────

/// Handle to one family's discovery task.
///
/// Cheaply cloneable. Every method talks to the task over a channel and
/// fails with [`CoreError::ServiceStopped`] once it has shut down.
#[derive(Clone)]
pub struct DiscoveryHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    family: ProtocolFamily,
    command_tx: mpsc::Sender<ServiceCommand>,
    state: watch::Receiver<DiscoveryState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryHandle {
    /// Load the family's saved records and spawn its task.
    ///
    /// Discovery starts immediately and stays on for the startup grace
    /// regardless of [`stop`](Self::stop) calls. `broadcast_failed`
    /// marks the SSDP listener as unavailable for state reporting.
    pub fn spawn(
        config: DiscoveryConfig,
        probe: HttpProbe,
        bus: PacketBus,
        broadcast_failed: bool,
    ) -> Self {
        let mut engine = DiscoveryEngine::new(&config);
        engine.set_connection_error(broadcast_failed);
        for ip in &config.manual_ips {
            engine.add_manual_ip(ip);
        }
        engine.begin_grace();

        let family = config.family;
        let (state_tx, state_rx) = watch::channel(engine.state());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(engine_task(
            engine,
            EngineTask {
                config,
                probe,
                bus,
                commands: command_rx,
                state_tx,
                cancel: cancel.clone(),
            },
        ));

        Self {
            inner: Arc::new(HandleInner {
                family,
                command_tx,
                state: state_rx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    pub fn family(&self) -> ProtocolFamily {
        self.inner.family
    }

    /// Keep discovery running past the startup grace.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.send(ServiceCommand::Start).await
    }

    /// Stop discovery (deferred until the startup grace ends).
    pub async fn stop(&self) -> Result<(), CoreError> {
        self.send(ServiceCommand::Stop).await
    }

    /// Returns `false` if the address was empty or already tracked.
    pub async fn add_manual_ip(&self, ip: &str) -> Result<bool, CoreError> {
        let ip = ip.to_owned();
        self.request(|reply| ServiceCommand::AddManualIp { ip, reply })
            .await
    }

    /// Forget a device by serial or IP.
    pub async fn remove(&self, key: &str) -> Result<ConnectionRecord, CoreError> {
        let key = key.to_owned();
        let identifier = key.clone();
        self.request(|reply| ServiceCommand::Remove { key, reply })
            .await?
            .ok_or(CoreError::DeviceNotFound { identifier })
    }

    /// Set the display name of a device named by serial or IP.
    pub async fn rename(&self, key: &str, name: &str) -> Result<bool, CoreError> {
        let key = key.to_owned();
        let name = name.to_owned();
        self.request(|reply| ServiceCommand::Rename { key, name, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<DiscoverySnapshot, CoreError> {
        self.request(|reply| ServiceCommand::Snapshot { reply }).await
    }

    /// Current aggregate state.
    pub fn state(&self) -> DiscoveryState {
        *self.inner.state.borrow()
    }

    /// Receiver that sees every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<DiscoveryState> {
        self.inner.state.clone()
    }

    /// Cancel the task and wait for it to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(task) = self.inner.task.lock().await.take() {
            let _ = task.await;
        }
    }

    async fn send(&self, command: ServiceCommand) -> Result<(), CoreError> {
        self.inner
            .command_tx
            .send(command)
            .await
            .map_err(|_| CoreError::ServiceStopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ServiceCommand,
    ) -> Result<T, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| CoreError::ServiceStopped)
    }
}

// ── Background task ──────────────────────────────────────────────────

struct EngineTask {
    config: DiscoveryConfig,
    probe: HttpProbe,
    bus: PacketBus,
    commands: mpsc::Receiver<ServiceCommand>,
    state_tx: watch::Sender<DiscoveryState>,
    cancel: CancellationToken,
}

async fn engine_task(mut engine: DiscoveryEngine, task: EngineTask) {
    let EngineTask {
        config,
        probe,
        bus,
        mut commands,
        state_tx,
        cancel,
    } = task;
    let family = config.family;

    let (result_tx, mut result_rx) = mpsc::channel::<ProbeOutcome>(PROBE_CHANNEL_SIZE);
    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let grace = tokio::time::sleep(config.startup_grace);
    tokio::pin!(grace);
    let mut grace_pending = true;
    let mut packets = engine.is_running().then(|| bus.subscribe());

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = commands.recv() => {
                let Some(command) = command else { break };
                if handle_command(&mut engine, command) {
                    ticker.reset_immediately();
                }
            }
            () = &mut grace, if grace_pending => {
                grace_pending = false;
                if engine.finish_grace() {
                    debug!(%family, "startup grace over, discovery stopped");
                }
            }
            Some(outcome) = result_rx.recv() => {
                engine.on_probe(outcome);
            }
            received = next_packet(&mut packets) => match received {
                Ok(packet) => {
                    engine.on_broadcast(&packet);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(%family, skipped, "broadcast receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => packets = None,
            },
            _ = ticker.tick(), if engine.is_running() => {
                let now = tokio::time::Instant::now().into_std();
                for request in engine.plan_tick(now) {
                    spawn_probe(&probe, request, &result_tx);
                }
            }
        }

        // Subscribed to broadcasts only while running.
        match (engine.is_running(), packets.is_some()) {
            (true, false) => packets = Some(bus.subscribe()),
            (false, true) => packets = None,
            _ => {}
        }

        let state = engine.state();
        state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                info!(%family, %state, "discovery state changed");
                *current = state;
                true
            }
        });
    }

    debug!(%family, "discovery task exiting");
}

/// Apply a command. Returns `true` when discovery was (re)started.
fn handle_command(engine: &mut DiscoveryEngine, command: ServiceCommand) -> bool {
    match command {
        ServiceCommand::Start => return engine.start(),
        ServiceCommand::Stop => {
            if !engine.stop() && engine.in_grace() {
                debug!("stop requested during startup grace, deferring");
            }
        }
        ServiceCommand::AddManualIp { ip, reply } => {
            let _ = reply.send(engine.add_manual_ip(&ip));
        }
        ServiceCommand::Remove { key, reply } => {
            let _ = reply.send(engine.remove(&key));
        }
        ServiceCommand::Rename { key, name, reply } => {
            let _ = reply.send(engine.rename(&key, &name));
        }
        ServiceCommand::Snapshot { reply } => {
            let _ = reply.send(engine.snapshot());
        }
    }
    false
}

async fn next_packet(
    rx: &mut Option<broadcast::Receiver<Arc<SsdpPacket>>>,
) -> Result<Arc<SsdpPacket>, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn spawn_probe(probe: &HttpProbe, request: ProbeRequest, results: &mpsc::Sender<ProbeOutcome>) {
    let probe = probe.clone();
    let results = results.clone();
    tokio::spawn(async move {
        let outcome = probe.execute(request).await;
        let _ = results.send(outcome).await;
    });
}

// ── DiscoveryService ─────────────────────────────────────────────────

/// All discovery engines plus the shared probe client and SSDP listener.
pub struct DiscoveryService {
    handles: Vec<DiscoveryHandle>,
    listener: Option<SsdpListener>,
}

impl DiscoveryService {
    /// Build the probe client, bind the broadcast listener and spawn one
    /// task per family.
    ///
    /// A listener that cannot bind is not fatal: engines still work from
    /// manual addresses and the directory, and report
    /// [`DiscoveryState::ConnectionError`] while they have nothing else.
    pub async fn launch(
        network: &NetworkConfig,
        families: Vec<DiscoveryConfig>,
    ) -> Result<Self, CoreError> {
        let probe = HttpProbe::new(&network.transport, network.nupnp_url()?, &network.app_name)?;
        let bus = PacketBus::new();

        let listener = if network.disable_broadcast {
            None
        } else {
            match SsdpListener::bind(network.ssdp.clone(), bus.clone(), CancellationToken::new()).await {
                Ok(listener) => Some(listener),
                Err(e) => {
                    warn!(error = %e, "cannot listen for SSDP broadcasts");
                    None
                }
            }
        };
        let broadcast_failed = !network.disable_broadcast && listener.is_none();

        let handles = families
            .into_iter()
            .map(|config| DiscoveryHandle::spawn(config, probe.clone(), bus.clone(), broadcast_failed))
            .collect();

        Ok(Self { handles, listener })
    }

    pub fn handles(&self) -> &[DiscoveryHandle] {
        &self.handles
    }

    pub fn handle(&self, family: ProtocolFamily) -> Option<&DiscoveryHandle> {
        self.handles.iter().find(|h| h.family() == family)
    }

    /// Ask every engine to keep running past the startup grace.
    pub async fn start_all(&self) -> Result<(), CoreError> {
        for handle in &self.handles {
            handle.start().await?;
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        for handle in &self.handles {
            handle.shutdown().await;
        }
        if let Some(listener) = &self.listener {
            listener.shutdown();
        }
    }
}
