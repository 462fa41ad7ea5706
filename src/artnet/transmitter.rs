use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;

use super::{encode_into, PacketSink, PortAddress, Sequence};
use crate::models::{self, Universe};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("all {attempts} transmission attempts failed: {last_error}")]
    SendFailed { attempts: u32, last_error: String },
    #[error("the lighting controller is no longer running")]
    ControllerGone,
}

/// How many datagrams a single transmission produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stop at the first datagram that was sent
    Once,
    /// Send every attempt, ArtNet has no acknowledgment
    Redundant,
}

pub struct Transmitter {
    sink: Box<dyn PacketSink>,
    address: PortAddress,
    sequence: Sequence,
    attempts: u32,
    spacing: Duration,
    buffer: BytesMut,
}

impl Transmitter {
    pub fn new(sink: Box<dyn PacketSink>, config: &models::ArtNet) -> Self {
        Self {
            sink,
            address: PortAddress::new(config.net, config.subnet, config.universe),
            sequence: Sequence::new(),
            attempts: config.attempts.max(1),
            spacing: config.attempt_spacing(),
            buffer: BytesMut::new(),
        }
    }

    pub fn address(&self) -> PortAddress {
        self.address
    }

    /// Transmit a universe, succeeding if at least one datagram went out
    ///
    /// Every call consumes one sequence number, shared by all its datagrams.
    pub async fn send(&mut self, universe: &Universe, delivery: Delivery) -> Result<(), NetworkError> {
        let sequence = self.sequence.next();

        self.buffer.clear();
        encode_into(&mut self.buffer, self.address, universe, sequence);
        let packet = self.buffer.split().freeze();

        let mut delivered = false;
        let mut last_error = None;

        for attempt in 0..self.attempts {
            if attempt > 0 {
                tokio::time::sleep(self.spacing).await;
            }

            match self.sink.send(&packet).await {
                Ok(()) => {
                    delivered = true;

                    if delivery == Delivery::Once {
                        break;
                    }
                }
                Err(error) => {
                    debug!(sequence, attempt, error = %error, "ArtNet datagram failed");
                    last_error = Some(error);
                }
            }
        }

        if delivered {
            trace!(sequence, "sent universe");
            Ok(())
        } else {
            Err(NetworkError::SendFailed {
                attempts: self.attempts,
                last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
            })
        }
    }
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("address", &self.address)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artnet::{DummySink, HEADER_LEN};

    fn transmitter(sink: &DummySink) -> Transmitter {
        Transmitter::new(Box::new(sink.clone()), &models::ArtNet::default())
    }

    #[tokio::test(start_paused = true)]
    async fn redundant_delivery_sends_every_attempt() {
        let sink = DummySink::new();
        let mut tx = transmitter(&sink);

        let start = tokio::time::Instant::now();
        tx.send(&Universe::filled(10), Delivery::Redundant)
            .await
            .expect("send should succeed");

        let packets = sink.packets();
        assert_eq!(packets.len(), 5);
        assert!(packets.iter().all(|p| p[12] == 1));
        assert!(packets.iter().all(|p| p[HEADER_LEN] == 10));
        assert_eq!(start.elapsed(), Duration::from_millis(120));
    }

    #[tokio::test(start_paused = true)]
    async fn once_delivery_stops_at_first_success() {
        let sink = DummySink::new();
        let mut tx = transmitter(&sink);

        tx.send(&Universe::zero(), Delivery::Once).await.expect("send");
        tx.send(&Universe::zero(), Delivery::Once).await.expect("send");

        let packets = sink.packets();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0][12], 1);
        assert_eq!(packets[1][12], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_still_consume_sequence_numbers() {
        let sink = DummySink::new();
        let mut tx = transmitter(&sink);

        sink.set_failing(true);
        let result = tx.send(&Universe::zero(), Delivery::Once).await;
        assert!(matches!(result, Err(NetworkError::SendFailed { attempts: 5, .. })));

        sink.set_failing(false);
        tx.send(&Universe::zero(), Delivery::Once).await.expect("send");
        assert_eq!(sink.last_packet().map(|p| p[12]), Some(2));
    }
}
