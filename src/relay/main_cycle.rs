//! Main relay cycle with statum typestate
//!
//! ```text
//! Stopped ──start()──► Running ──run()/shutdown()──► ShutDown
//! ```
//!
//! Each tick: sleep the rest of the period, drain tracking events, apply queued commands,
//! sample input, publish. The tracking session is shut down exactly once, when the
//! `Running` machine is consumed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use statum::{machine, state};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::RelayError;
use crate::command::{CommandError, CommandListener, RelayCommand};
use crate::config::RelayParams;
use crate::devices::DeviceRegistry;
use crate::input::InputSampler;
use crate::output::{PublishOutcome, PublisherStats, StatePublisher};
use crate::tracking::{TrackingEvent, TrackingSystem};

const COMMAND_QUEUE: usize = 64;

#[state]
#[derive(Debug, Clone)]
pub enum CycleState {
    Stopped,  // Built, nothing sampled yet
    Running,  // Ticking at the configured rate
    ShutDown, // Tracking session released
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub ticks: u64,
    pub vibrations: u64,
    pub dropped_commands: u64,
}

#[machine]
#[derive(Debug)]
pub struct MainCycle<S: CycleState> {
    system: Box<dyn TrackingSystem>,
    registry: DeviceRegistry,
    sampler: InputSampler,
    publisher: StatePublisher,

    // Zero means unpaced
    period: Duration,

    running: Arc<AtomicBool>,
    configured: watch::Sender<bool>,
    command_sender: mpsc::Sender<RelayCommand>,
    commands: mpsc::Receiver<RelayCommand>,
    listener: Option<JoinHandle<()>>,
    stats: CycleStats,
}

impl<S: CycleState> MainCycle<S> {
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub fn publisher_stats(&self) -> PublisherStats {
        self.publisher.stats()
    }
}

impl MainCycle<Stopped> {
    pub fn create(
        system: Box<dyn TrackingSystem>,
        registry: DeviceRegistry,
        publisher: StatePublisher,
        period: Duration,
        running: Arc<AtomicBool>,
    ) -> Self {
        debug!(
            "Creating main cycle for {} devices, period {:?}",
            registry.len(),
            period
        );
        let (configured, _) = watch::channel(false);
        let (command_sender, commands) = mpsc::channel(COMMAND_QUEUE);

        Self::new(
            system,
            registry,
            InputSampler::new(),
            publisher,
            period,
            running,
            configured,
            command_sender,
            commands,
            None, // listener
            CycleStats::default(),
        )
    }

    /// Builds registry and publisher from the configuration and binds the command
    /// listener when a command port is configured
    pub async fn prepare(
        params: &RelayParams,
        system: Box<dyn TrackingSystem>,
        running: Arc<AtomicBool>,
    ) -> Result<Self, RelayError> {
        let registry = DeviceRegistry::from_params(params)?;
        let publisher = StatePublisher::connect(params).await?;
        let mut cycle = Self::create(system, registry, publisher, params.update_period(), running);

        if let Some(port) = params.command_port {
            cycle.attach_listener(port).await?;
        }
        Ok(cycle)
    }

    /// Spawns the command listener. It stays idle until [`MainCycle::start`].
    pub async fn attach_listener(&mut self, port: u16) -> Result<SocketAddr, CommandError> {
        let listener = CommandListener::bind(
            port,
            self.command_sender.clone(),
            self.configured.subscribe(),
            self.running.clone(),
        )
        .await?;
        let addr = listener
            .local_addr()
            .map_err(|source| CommandError::Bind { port, source })?;

        self.listener = Some(listener.spawn());
        Ok(addr)
    }

    /// Channel into the command queue, in addition to the UDP listener
    pub fn command_sender(&self) -> mpsc::Sender<RelayCommand> {
        self.command_sender.clone()
    }

    pub fn start(self) -> MainCycle<Running> {
        info!(
            "Starting relay cycle with {} configured devices",
            self.registry.len()
        );
        self.running.store(true, Ordering::SeqCst);
        self.configured.send_replace(true);
        self.transition()
    }
}

impl MainCycle<Running> {
    /// Ticks until the run flag is cleared or the runtime asks to quit, then tears down
    pub async fn run(mut self) -> MainCycle<ShutDown> {
        info!("Entering main loop");

        let mut last_tick = Duration::ZERO;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);
        let mut ticks_since_log = 0u64;

        while self.running.load(Ordering::SeqCst) {
            let pause = self.period.saturating_sub(last_tick);
            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(pause).await;
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let started = Instant::now();
            self.tick().await;
            last_tick = started.elapsed();
            ticks_since_log += 1;

            let now = Local::now();
            if now.signed_duration_since(last_log_time) >= log_interval {
                let elapsed =
                    now.signed_duration_since(last_log_time).num_milliseconds() as f64 / 1000.0;
                info!(
                    "Relay stats: {} ticks in {:.1} seconds (avg {:.1}/sec), {} active devices",
                    ticks_since_log,
                    elapsed,
                    ticks_since_log as f64 / elapsed,
                    self.registry.active_count()
                );
                debug!("Totals: {:?}, {:?}", self.stats, self.publisher.stats());
                last_log_time = now;
                ticks_since_log = 0;
            }
        }

        self.shutdown().await
    }

    /// One iteration without pacing. Returns `None` if the runtime asked to quit.
    pub async fn tick(&mut self) -> Option<PublishOutcome> {
        self.stats.ticks += 1;

        if !self.drain_events() {
            return None;
        }
        self.apply_commands();

        self.sampler.sample(self.system.as_ref(), &mut self.registry);

        Some(self.publisher.publish(&self.registry).await)
    }

    fn drain_events(&mut self) -> bool {
        while let Some(event) = self.system.poll_event() {
            match event {
                TrackingEvent::DeviceActivated(index) => {
                    debug!("Tracking runtime activated device {}", index)
                }
                TrackingEvent::DeviceDeactivated(index) => {
                    debug!("Tracking runtime deactivated device {}", index)
                }
                TrackingEvent::Quit => {
                    info!("Tracking runtime requested quit");
                    self.running.store(false, Ordering::SeqCst);
                    return false;
                }
            }
        }
        true
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                RelayCommand::Vibrate {
                    device,
                    duration_us,
                    axis,
                } => match self.registry.active_index_of(&device) {
                    Some(index) => {
                        debug!("Vibrating {} (index {}) for {}us", device, index, duration_us);
                        self.system.trigger_haptic_pulse(index, axis, duration_us);
                        self.stats.vibrations += 1;
                    }
                    None => {
                        warn!("Cannot vibrate {}: device is not active", device);
                        self.stats.dropped_commands += 1;
                    }
                },
                RelayCommand::Quit => {
                    info!("Quit command received");
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }
    }

    /// Closes the command queue and joins the listener, then releases the tracking session
    pub async fn shutdown(mut self) -> MainCycle<ShutDown> {
        info!("Shutting down relay cycle");
        self.running.store(false, Ordering::SeqCst);

        // Unapplied commands are discarded
        self.commands.close();
        let mut discarded = 0u64;
        while self.commands.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!("Discarded {} pending commands", discarded);
            self.stats.dropped_commands += discarded;
        }

        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                error!("Command listener task failed: {}", e);
            }
        }

        self.system.shutdown();
        info!(
            "Relay stopped after {} ticks: {:?}, {:?}",
            self.stats.ticks,
            self.stats,
            self.publisher.stats()
        );
        self.transition()
    }
}

impl MainCycle<ShutDown> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ButtonSpec, DeviceSpec};
    use crate::devices::{ButtonId, DeviceRole, ValueKind, ValueKinds};
    use crate::tracking::{ControllerRole, HapticPulse, SimulatedDevice, SimulatedSystem};
    use serde_json::Value;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    fn hand(name: &str, role: DeviceRole) -> DeviceSpec {
        DeviceSpec {
            name: name.to_string(),
            role,
            track_pose: true,
            buttons: vec![ButtonSpec {
                id: ButtonId::Axis1,
                name: "trigger".to_string(),
                kinds: ValueKinds::NONE.with(ValueKind::Boolean),
            }],
        }
    }

    fn params(port: u16, command_port: Option<u16>) -> RelayParams {
        RelayParams {
            bimanual: true,
            out_addr: "127.0.0.1".to_string(),
            out_port: port,
            update_freq: 100,
            command_port,
            devices: vec![
                hand("left_hand", DeviceRole::Left),
                hand("right_hand", DeviceRole::Right),
            ],
        }
    }

    fn two_hands() -> SimulatedSystem {
        let mut system = SimulatedSystem::new();
        system.attach(1, SimulatedDevice::controller(ControllerRole::LeftHand));
        system.attach(2, SimulatedDevice::controller(ControllerRole::RightHand));
        system.set_pressed(1, ButtonId::Axis1, true);
        system
    }

    async fn receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    #[tokio::test]
    async fn relays_frames_until_stopped() {
        let (socket, port) = receiver().await;
        let system = two_hands();
        let shutdowns = system.shutdown_counter();
        let running = Arc::new(AtomicBool::new(false));

        let cycle = MainCycle::prepare(&params(port, None), Box::new(system), running.clone())
            .await
            .unwrap();

        let stop = running.clone();
        let receive = tokio::spawn(async move {
            let mut buffer = vec![0u8; 64 * 1024];
            let len = timeout(Duration::from_secs(2), socket.recv(&mut buffer))
                .await
                .unwrap()
                .unwrap();
            stop.store(false, Ordering::SeqCst);
            serde_json::from_slice::<Value>(&buffer[..len]).unwrap()
        });

        let stopped = cycle.start().run().await;
        let frame = receive.await.unwrap();

        assert_eq!(frame["left_hand"]["trigger"]["boolean"], true);
        assert_eq!(frame["right_hand"]["trigger"]["boolean"], false);
        assert_eq!(frame["left_hand"]["pose"]["orientation"]["w"], 1.0);
        assert!(stopped.publisher_stats().sent >= 1);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quit_event_ends_the_cycle() {
        let (_socket, port) = receiver().await;
        let mut system = two_hands();
        system.push_event(TrackingEvent::Quit);
        let shutdowns = system.shutdown_counter();
        let running = Arc::new(AtomicBool::new(false));

        let cycle = MainCycle::prepare(&params(port, None), Box::new(system), running.clone())
            .await
            .unwrap();
        let stopped = timeout(Duration::from_secs(2), cycle.start().run())
            .await
            .unwrap();

        assert_eq!(stopped.publisher_stats(), PublisherStats::default());
        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn vibrate_targets_active_devices_only() {
        let (_socket, port) = receiver().await;
        let system = two_hands();
        let pulses = system.haptic_log();
        let running = Arc::new(AtomicBool::new(false));

        let cycle = MainCycle::prepare(&params(port, None), Box::new(system), running)
            .await
            .unwrap();
        let commands = cycle.command_sender();
        let mut cycle = cycle.start();

        // Nothing sampled yet, so nothing is active
        commands
            .send(RelayCommand::Vibrate {
                device: "left_hand".to_string(),
                duration_us: 3000,
                axis: 0,
            })
            .await
            .unwrap();
        assert!(matches!(cycle.tick().await, Some(PublishOutcome::Sent { .. })));
        assert!(pulses.lock().unwrap().is_empty());
        assert_eq!(cycle.stats().dropped_commands, 1);

        commands
            .send(RelayCommand::Vibrate {
                device: "right_hand".to_string(),
                duration_us: 1200,
                axis: 1,
            })
            .await
            .unwrap();
        cycle.tick().await;
        assert_eq!(
            pulses.lock().unwrap().as_slice(),
            &[HapticPulse {
                index: 2,
                axis: 1,
                duration_us: 1200
            }]
        );

        cycle.shutdown().await;
    }

    #[tokio::test]
    async fn quit_over_udp_joins_listener_before_shutdown() {
        let (_socket, port) = receiver().await;
        let system = two_hands();
        let shutdowns = system.shutdown_counter();
        let running = Arc::new(AtomicBool::new(false));

        let mut cycle = MainCycle::create(
            Box::new(system),
            DeviceRegistry::from_params(&params(port, None)).unwrap(),
            StatePublisher::connect(&params(port, None)).await.unwrap(),
            Duration::from_millis(5),
            running.clone(),
        );
        let command_addr = cycle.attach_listener(0).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let quit = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            client.send_to(b"quit", command_addr).await.unwrap();
        });

        let stopped = timeout(Duration::from_secs(5), cycle.start().run())
            .await
            .unwrap();
        quit.await.unwrap();

        assert!(stopped.stats().ticks > 0);
        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn command_flood_does_not_stall_shutdown() {
        let (_socket, port) = receiver().await;
        let system = two_hands();
        let shutdowns = system.shutdown_counter();
        let pulses = system.haptic_log();
        let running = Arc::new(AtomicBool::new(false));

        let mut cycle = MainCycle::create(
            Box::new(system),
            DeviceRegistry::from_params(&params(port, None)).unwrap(),
            StatePublisher::connect(&params(port, None)).await.unwrap(),
            Duration::from_millis(500),
            running.clone(),
        );
        let command_addr = cycle.attach_listener(0).await.unwrap();
        let cycle = cycle.start();

        let stop = running.clone();
        let flood = tokio::spawn(async move {
            let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let vibrate = br#"{"command":"vibrate","device":"left_hand"}"#;
            for _ in 0..80 {
                client.send_to(vibrate, command_addr).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            stop.store(false, Ordering::SeqCst);
        });

        let stopped = timeout(Duration::from_secs(5), cycle.run())
            .await
            .unwrap();
        flood.await.unwrap();

        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(stopped.stats().dropped_commands > 0);
        assert!(stopped.stats().dropped_commands <= COMMAND_QUEUE as u64);
        assert!(pulses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_configuration_never_starts() {
        let mut bad = params(9, None);
        bad.devices[1].name = "left_hand".to_string();
        let result = MainCycle::prepare(
            &bad,
            Box::new(SimulatedSystem::new()),
            Arc::new(AtomicBool::new(false)),
        )
        .await;
        assert!(matches!(result, Err(RelayError::Registry(_))));
    }
}
