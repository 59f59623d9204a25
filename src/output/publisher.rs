use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace, warn};

use super::message::frame_from_registry;
use crate::config::RelayParams;
use crate::devices::DeviceRegistry;

const INDENT: &[u8] = b"   ";

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Invalid output address specified: '{0}'")]
    InvalidAddress(String),

    #[error("Could not initialize socket: {0}")]
    Bind(std::io::Error),

    #[error("Socket connection to {target} failed: {source}")]
    Connect {
        target: SocketAddr,
        source: std::io::Error,
    },
}

/// Why a tick produced no message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Bimanual mode with at least one hand missing
    MissingHands,
    NoActiveDevices,
}

impl fmt::Display for Suppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suppression::MissingHands => write!(f, "missing devices for bimanual control"),
            Suppression::NoActiveDevices => write!(f, "no devices are currently active"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent { bytes: usize },
    Suppressed(Suppression),
    SendFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub sent: u64,
    pub suppressed: u64,
    pub failed: u64,
}

/// Serializes the active devices and sends one datagram per tick
#[derive(Debug)]
pub struct StatePublisher {
    socket: UdpSocket,
    target: SocketAddr,
    bimanual: bool,
    last_suppression: Option<Suppression>,
    stats: PublisherStats,
}

impl StatePublisher {
    /// Binds an ephemeral local socket and connects it to the configured destination
    pub async fn connect(params: &RelayParams) -> Result<Self, PublisherError> {
        let target = resolve_target(&params.out_addr, params.out_port)?;
        let local: SocketAddr = match target.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(local).await.map_err(PublisherError::Bind)?;
        socket
            .connect(target)
            .await
            .map_err(|source| PublisherError::Connect { target, source })?;

        info!("Publishing device state to {}", target);
        Ok(Self {
            socket,
            target,
            bimanual: params.bimanual,
            last_suppression: None,
            stats: PublisherStats::default(),
        })
    }

    pub fn stats(&self) -> PublisherStats {
        self.stats
    }

    pub fn suppression(&self, registry: &DeviceRegistry) -> Option<Suppression> {
        if self.bimanual && (!registry.left_found() || !registry.right_found()) {
            return Some(Suppression::MissingHands);
        }
        if registry.active_count() == 0 {
            return Some(Suppression::NoActiveDevices);
        }
        None
    }

    /// Pretty-printed frame of all active devices
    pub fn render(registry: &DeviceRegistry) -> Result<Vec<u8>, serde_json::Error> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(INDENT);
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        frame_from_registry(registry).serialize(&mut serializer)?;
        Ok(buffer)
    }

    /// Sends the current frame unless suppressed. Never retries.
    pub async fn publish(&mut self, registry: &DeviceRegistry) -> PublishOutcome {
        if let Some(reason) = self.suppression(registry) {
            if self.last_suppression != Some(reason) {
                info!("No data published: {}", reason);
            } else {
                debug!("No data published: {}", reason);
            }
            self.last_suppression = Some(reason);
            self.stats.suppressed += 1;
            return PublishOutcome::Suppressed(reason);
        }
        if let Some(previous) = self.last_suppression.take() {
            info!("Publishing resumed (was suppressed: {})", previous);
        }

        let payload = match Self::render(registry) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize device state: {}", e);
                self.stats.failed += 1;
                return PublishOutcome::SendFailed;
            }
        };

        match self.socket.send(&payload).await {
            Ok(bytes) => {
                trace!("Published frame:\n{}", String::from_utf8_lossy(&payload));
                self.stats.sent += 1;
                PublishOutcome::Sent { bytes }
            }
            Err(e) => {
                warn!("Failed to send device state to {}: {}", self.target, e);
                self.stats.failed += 1;
                PublishOutcome::SendFailed
            }
        }
    }
}

/// Empty address means the local host
fn resolve_target(addr: &str, port: u16) -> Result<SocketAddr, PublisherError> {
    let ip = if addr.is_empty() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        addr.parse::<IpAddr>()
            .map_err(|_| PublisherError::InvalidAddress(addr.to_string()))?
    };
    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Device, DeviceRole};
    use serde_json::Value;
    use std::time::Duration;

    fn params(bimanual: bool, port: u16) -> RelayParams {
        RelayParams {
            bimanual,
            out_addr: "127.0.0.1".to_string(),
            out_port: port,
            update_freq: 90,
            command_port: None,
            devices: Vec::new(),
        }
    }

    fn registry() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry.insert(Device::new("left_hand", DeviceRole::Left, true)).unwrap();
        registry.insert(Device::new("right_hand", DeviceRole::Right, true)).unwrap();
        registry
    }

    async fn receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    async fn try_receive(socket: &UdpSocket) -> Option<Value> {
        let mut buffer = vec![0u8; 64 * 1024];
        let received = socket.recv(&mut buffer);
        match tokio::time::timeout(Duration::from_millis(200), received).await {
            Ok(Ok(len)) => Some(serde_json::from_slice(&buffer[..len]).unwrap()),
            _ => None,
        }
    }

    #[test]
    fn resolves_targets() {
        assert_eq!(
            resolve_target("", 9000).unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(resolve_target("::1", 1).unwrap().port(), 1);
        assert!(matches!(
            resolve_target("not an address", 1),
            Err(PublisherError::InvalidAddress(_))
        ));
    }

    #[test]
    fn render_uses_three_space_indent() {
        let mut registry = registry();
        let left = registry.find_by_role(DeviceRole::Left, false);
        registry.activate(left, 1);

        let rendered = String::from_utf8(StatePublisher::render(&registry).unwrap()).unwrap();
        assert!(rendered.starts_with("{\n   \"left_hand\": {\n      \"role\": \"left\""));
    }

    #[tokio::test]
    async fn bimanual_waits_for_both_hands() {
        let (socket, port) = receiver().await;
        let mut publisher = StatePublisher::connect(&params(true, port)).await.unwrap();
        let mut registry = registry();

        let right = registry.find_by_role(DeviceRole::Right, false);
        registry.activate(right, 2);
        assert_eq!(
            publisher.publish(&registry).await,
            PublishOutcome::Suppressed(Suppression::MissingHands)
        );
        assert!(try_receive(&socket).await.is_none());

        let left = registry.find_by_role(DeviceRole::Left, false);
        registry.activate(left, 1);
        assert!(matches!(
            publisher.publish(&registry).await,
            PublishOutcome::Sent { .. }
        ));

        let frame = try_receive(&socket).await.unwrap();
        assert_eq!(frame["left_hand"]["role"], "left");
        assert_eq!(frame["right_hand"]["role"], "right");
        assert_eq!(
            publisher.stats(),
            PublisherStats {
                sent: 1,
                suppressed: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn nothing_active_is_suppressed() {
        let (socket, port) = receiver().await;
        let mut publisher = StatePublisher::connect(&params(false, port)).await.unwrap();
        let registry = registry();

        assert_eq!(
            publisher.publish(&registry).await,
            PublishOutcome::Suppressed(Suppression::NoActiveDevices)
        );
        assert!(try_receive(&socket).await.is_none());
    }

    #[tokio::test]
    async fn single_hand_publishes_without_bimanual() {
        let (socket, port) = receiver().await;
        let mut publisher = StatePublisher::connect(&params(false, port)).await.unwrap();
        let mut registry = registry();
        let right = registry.find_by_role(DeviceRole::Right, false);
        registry.activate(right, 0);

        assert!(matches!(
            publisher.publish(&registry).await,
            PublishOutcome::Sent { .. }
        ));
        let frame = try_receive(&socket).await.unwrap();
        assert!(frame.get("left_hand").is_none());
        assert_eq!(frame["right_hand"]["pose"]["position"]["x"], 0.0);
    }
}
