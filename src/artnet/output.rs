use std::{
    io::{Error, ErrorKind, Result},
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;

use crate::models;

/// Destination for encoded ArtNet packets
#[async_trait]
pub trait PacketSink: Send {
    async fn send(&mut self, packet: &Bytes) -> Result<()>;
}

pub fn from_config(output: &models::Output) -> Box<dyn PacketSink> {
    match output {
        models::Output::Udp { host, port } => Box::new(UdpSink::new(format!("{}:{}", host, port))),
        models::Output::Dummy => Box::new(DummySink::new()),
    }
}

/// Bound socket and resolved target
#[derive(Debug)]
struct Session {
    remote_addr: SocketAddr,
    socket: UdpSocket,
}

impl Session {
    async fn open(address: &str) -> Result<Self> {
        let remote_addr = tokio::net::lookup_host(address)
            .await?
            .next()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no address for ArtNet node"))?;

        // Choose correct IP version for local addr
        let local_addr = if remote_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(local_addr).await?;
        socket.set_broadcast(true)?;

        Ok(Self {
            remote_addr,
            socket,
        })
    }
}

/// Sends packets to an ArtNet node over UDP
///
/// The address is resolved and the socket bound on first use. Any send error drops the session
/// so the next packet starts over.
#[derive(Debug)]
pub struct UdpSink {
    address: String,
    session: Option<Session>,
}

impl UdpSink {
    pub fn new(address: String) -> Self {
        Self {
            address,
            session: None,
        }
    }
}

#[async_trait]
impl PacketSink for UdpSink {
    async fn send(&mut self, packet: &Bytes) -> Result<()> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                let session = Session::open(&self.address).await?;
                debug!(address = %self.address, remote = %session.remote_addr, "bound ArtNet socket");
                session
            }
        };

        match session.socket.send_to(packet, session.remote_addr).await {
            Ok(_written) => {
                self.session = Some(session);
                Ok(())
            }
            Err(error) => {
                // Next call re-resolves and binds a new socket
                warn!(address = %self.address, error = %error, "sending datagram failed");
                Err(error)
            }
        }
    }
}

#[derive(Debug, Default)]
struct DummyState {
    packets: Vec<Bytes>,
    failing: bool,
}

/// In-memory sink recording every packet
///
/// Clones share the same recording, so a test can keep one while the controller owns another.
#[derive(Debug, Default, Clone)]
pub struct DummySink {
    state: Arc<Mutex<DummyState>>,
}

impl DummySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail until reset
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failing = failing;
        }
    }

    pub fn packets(&self) -> Vec<Bytes> {
        self.state
            .lock()
            .map(|state| state.packets.clone())
            .unwrap_or_default()
    }

    pub fn packet_count(&self) -> usize {
        self.state.lock().map(|state| state.packets.len()).unwrap_or(0)
    }

    pub fn last_packet(&self) -> Option<Bytes> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.packets.last().cloned())
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.packets.clear();
        }
    }
}

#[async_trait]
impl PacketSink for DummySink {
    async fn send(&mut self, packet: &Bytes) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "dummy sink poisoned"))?;

        if state.failing {
            return Err(Error::new(ErrorKind::ConnectionRefused, "dummy sink failing"));
        }

        trace!(len = packet.len(), "dummy packet");
        state.packets.push(packet.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_sink_delivers_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.expect("bind receiver");
        let address = receiver.local_addr().expect("local addr");

        let mut sink = UdpSink::new(address.to_string());
        sink.send(&Bytes::from_static(b"Art-Net\0"))
            .await
            .expect("send datagram");

        let mut buf = [0u8; 32];
        let (len, _) = receiver.recv_from(&mut buf).await.expect("receive datagram");
        assert_eq!(&buf[..len], b"Art-Net\0");
    }

    #[tokio::test]
    async fn dummy_sink_failure_injection() {
        let sink = DummySink::new();
        let mut owned = sink.clone();

        owned.send(&Bytes::from_static(b"a")).await.expect("send");
        sink.set_failing(true);
        assert!(owned.send(&Bytes::from_static(b"b")).await.is_err());
        sink.set_failing(false);
        owned.send(&Bytes::from_static(b"c")).await.expect("send");

        assert_eq!(sink.packet_count(), 2);
        assert_eq!(sink.last_packet(), Some(Bytes::from_static(b"c")));
    }
}
