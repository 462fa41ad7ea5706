//! Network servers
//!
//! Each server accepts TCP connections and hands them to a per-client handler running on its own
//! task.

use std::{future::Future, net::SocketAddr};

use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use crate::{engine::Engine, models::ControlServer};

pub mod control;

/// A running server, stopped when dropped
pub struct ServerHandle {
    name: &'static str,
    local_addr: SocketAddr,
    join_handle: JoinHandle<()>,
}

impl ServerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

pub async fn bind<F, Fut, E>(
    name: &'static str,
    options: ControlServer,
    engine: Engine,
    handle_client: F,
) -> Result<ServerHandle, std::io::Error>
where
    F: Fn((TcpStream, SocketAddr), Engine) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display,
{
    let listener = TcpListener::bind((options.bind.as_str(), options.port)).await?;
    let local_addr = listener.local_addr()?;

    info!(server = name, address = %local_addr, "server listening");

    let join_handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok(client) => {
                    let peer_addr = client.1;
                    let future = handle_client(client, engine.clone());

                    tokio::spawn(async move {
                        match future.await {
                            Ok(()) => {
                                debug!(server = name, peer = %peer_addr, "client disconnected");
                            }
                            Err(error) => {
                                warn!(server = name, peer = %peer_addr, error = %error, "client error");
                            }
                        }
                    });
                }
                Err(error) => {
                    error!(server = name, error = %error, "accepting connection failed");
                }
            }
        }
    });

    Ok(ServerHandle {
        name,
        local_addr,
        join_handle,
    })
}
