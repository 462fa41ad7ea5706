//! Lighting controller task, the single writer of the universe

use std::time::Duration;

use tokio::{
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Interval, MissedTickBehavior},
};

use crate::{
    artnet::{Delivery, NetworkError, Transmitter},
    models::Universe,
    universe::UniverseStore,
};

#[derive(Debug)]
enum ControllerMessage {
    Send {
        universe: Universe,
        delivery: Delivery,
        tx: oneshot::Sender<Result<(), NetworkError>>,
    },
    Current(oneshot::Sender<Universe>),
    Stop(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ControllerControl {
    Continue,
    Break,
}

#[derive(Debug)]
pub struct Controller {
    store: UniverseStore,
    transmitter: Transmitter,
    heartbeat: Option<Interval>,
    handle_rx: mpsc::Receiver<ControllerMessage>,
}

impl Controller {
    /// Create a controller and its handle
    ///
    /// When `heartbeat` is set, the current universe is sent again whenever no frame went out
    /// for that long.
    pub fn new(transmitter: Transmitter, heartbeat: Option<Duration>) -> (Self, ControllerHandle) {
        let (tx, handle_rx) = mpsc::channel(16);

        let heartbeat = heartbeat.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        (
            Self {
                store: UniverseStore::new(),
                transmitter,
                heartbeat,
                handle_rx,
            },
            ControllerHandle { tx },
        )
    }

    /// Create a controller and run it on a new task
    pub fn spawn(
        transmitter: Transmitter,
        heartbeat: Option<Duration>,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let (controller, handle) = Self::new(transmitter, heartbeat);
        (handle, tokio::spawn(controller.run()))
    }

    async fn transmit(&mut self, universe: Universe, delivery: Delivery) -> Result<(), NetworkError> {
        // The store follows every request, sent or not
        self.store.replace(universe);
        let current = self.store.current();

        if let Some(heartbeat) = &mut self.heartbeat {
            heartbeat.reset();
        }

        let result = self.transmitter.send(&current, delivery).await;

        if let Err(error) = &result {
            warn!(error = %error, "transmitting universe failed");
        }

        result
    }

    async fn handle_message(&mut self, message: ControllerMessage) -> ControllerControl {
        // ok: the controller shouldn't care if the requester went away

        match message {
            ControllerMessage::Send {
                universe,
                delivery,
                tx,
            } => {
                let result = self.transmit(universe, delivery).await;
                tx.send(result).ok();
            }
            ControllerMessage::Current(tx) => {
                tx.send(self.store.current()).ok();
            }
            ControllerMessage::Stop(tx) => {
                tx.send(()).ok();
                return ControllerControl::Break;
            }
        }

        ControllerControl::Continue
    }

    async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
        match heartbeat {
            Some(interval) => {
                interval.tick().await;
            }
            None => futures::future::pending::<()>().await,
        }
    }

    #[instrument(skip(self), fields(address = ?self.transmitter.address()))]
    pub async fn run(mut self) {
        info!("lighting controller started");

        loop {
            select! {
                message = self.handle_rx.recv() => {
                    if let Some(message) = message {
                        if ControllerControl::Break == self.handle_message(message).await {
                            break;
                        }
                    } else {
                        // Every handle was dropped
                        break;
                    }
                },
                _ = Self::heartbeat_tick(&mut self.heartbeat) => {
                    trace!("heartbeat");
                    let current = self.store.current();
                    self.transmit(current, Delivery::Once).await.ok();
                }
            }
        }

        info!("lighting controller stopped");
    }
}

/// Cloneable access to the lighting controller
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerMessage>,
}

impl ControllerHandle {
    pub async fn send(&self, universe: Universe, delivery: Delivery) -> Result<(), NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ControllerMessage::Send {
                universe,
                delivery,
                tx,
            })
            .await
            .map_err(|_| NetworkError::ControllerGone)?;
        rx.await.map_err(|_| NetworkError::ControllerGone)?
    }

    pub async fn current(&self) -> Result<Universe, NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ControllerMessage::Current(tx))
            .await
            .map_err(|_| NetworkError::ControllerGone)?;
        rx.await.map_err(|_| NetworkError::ControllerGone)
    }

    pub async fn stop(&self) -> Result<(), NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ControllerMessage::Stop(tx))
            .await
            .map_err(|_| NetworkError::ControllerGone)?;
        rx.await.map_err(|_| NetworkError::ControllerGone)
    }
}
