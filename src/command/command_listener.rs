use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_DATAGRAM: usize = 2048;

fn default_duration_us() -> u16 {
    3000
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to bind command socket on port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("Command is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Malformed command: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Runtime command received from an external controller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum RelayCommand {
    Quit,
    Vibrate {
        device: String,
        #[serde(default = "default_duration_us")]
        duration_us: u16,
        #[serde(default)]
        axis: u32,
    },
}

impl RelayCommand {
    /// Accepts the bare word `quit` or a JSON object tagged by `command`
    pub fn parse(datagram: &[u8]) -> Result<Self, CommandError> {
        let text = std::str::from_utf8(datagram)?.trim();
        if text.eq_ignore_ascii_case("quit") {
            return Ok(RelayCommand::Quit);
        }
        Ok(serde_json::from_str(text)?)
    }

    pub fn haptic_axis(&self) -> Option<u32> {
        match self {
            RelayCommand::Vibrate { axis, .. } => Some(*axis),
            RelayCommand::Quit => None,
        }
    }
}

/// Receives commands on the loopback interface and hands them to the main cycle.
///
/// Nothing is read from the socket until the cycle signals that it is configured. A
/// `quit` clears the shared run flag directly; everything else goes through the channel.
/// The listener never waits on the channel: commands arriving while it is full are dropped.
#[derive(Debug)]
pub struct CommandListener {
    socket: UdpSocket,
    sender: mpsc::Sender<RelayCommand>,
    configured: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
}

impl CommandListener {
    pub async fn bind(
        port: u16,
        sender: mpsc::Sender<RelayCommand>,
        configured: watch::Receiver<bool>,
        running: Arc<AtomicBool>,
    ) -> Result<Self, CommandError> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|source| CommandError::Bind { port, source })?;
        debug!("Command socket bound on port {}", port);

        Ok(Self {
            socket,
            sender,
            configured,
            running,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        if self.configured.wait_for(|configured| *configured).await.is_err() {
            debug!("Relay dropped before configuration finished, command listener exits");
            return;
        }

        match self.local_addr() {
            Ok(addr) => info!("Listening for commands on {}", addr),
            Err(_) => info!("Listening for commands"),
        }

        let mut buffer = [0u8; MAX_DATAGRAM];
        while self.running.load(Ordering::SeqCst) {
            let (len, from) = match timeout(POLL_INTERVAL, self.socket.recv_from(&mut buffer)).await
            {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!("Failed to receive command: {}", e);
                    continue;
                }
                Ok(Ok(received)) => received,
            };

            match RelayCommand::parse(&buffer[..len]) {
                Ok(RelayCommand::Quit) => {
                    info!("Quit requested by {}", from);
                    self.running.store(false, Ordering::SeqCst);
                }
                Ok(command) => {
                    debug!("Command from {}: {:?}", from, command);
                    match self.sender.try_send(command) {
                        Ok(()) => {}
                        Err(TrySendError::Full(command)) => {
                            warn!("Command queue full, dropping {:?}", command)
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!("Command receiver closed");
                            break;
                        }
                    }
                }
                Err(e) => warn!("Dropping command from {}: {}", from, e),
            }
        }

        info!("Command listener stopped");
    }
}
