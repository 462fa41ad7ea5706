//! JSON-lines control server

use std::{net::SocketAddr, time::Duration};

use futures::prelude::*;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::{engine::Engine, transition::FadeOutcome};

/// Request and response schema
mod message;
pub use message::{ControlRequest, ControlResponse};

/// Line-delimited JSON codec
mod codec;
pub use codec::{JsonCodec, JsonCodecError};

#[derive(Debug, Error)]
pub enum ControlServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] JsonCodecError),
}

pub async fn handle_client(
    (socket, peer_addr): (TcpStream, SocketAddr),
    engine: Engine,
) -> Result<(), ControlServerError> {
    debug!("accepted new connection from {}", peer_addr);

    let framed = Framed::new(socket, JsonCodec::new());
    let (mut writer, mut reader) = framed.split();

    while let Some(request) = reader.next().await {
        trace!("processing request: {:?}", request);

        let reply = match request? {
            Ok(request) => handle_request(request, &engine).await,
            Err(error) => ControlResponse::error(error),
        };

        trace!("sending response: {:?}", reply);

        writer.send(reply).await?;
    }

    Ok(())
}

/// Run one request against the engine
pub async fn handle_request(request: ControlRequest, engine: &Engine) -> ControlResponse {
    let result = match request {
        ControlRequest::SetProgram { key } => engine.set_program(&key).await.map(|_| ControlResponse::ok()),

        ControlRequest::FadeToProgram {
            key,
            duration,
            use_screensaver_power,
        } => engine
            .fade_to_program(&key, Duration::from_millis(duration), use_screensaver_power)
            .await
            .map(|outcome| ControlResponse::Fade {
                success: true,
                completed: outcome == FadeOutcome::Completed,
            }),

        ControlRequest::SetDirect { channels } => {
            engine.set_direct(channels).await.map(|_| ControlResponse::ok())
        }

        ControlRequest::Blackout => engine.blackout().await.map(|_| ControlResponse::ok()),

        ControlRequest::GetState => engine.get_state().await.map(|channels| ControlResponse::State {
            success: true,
            channels,
        }),

        ControlRequest::ListPrograms => Ok(ControlResponse::Programs {
            success: true,
            programs: engine.list_programs(),
        }),

        ControlRequest::GetProgram { key } => {
            engine
                .get_program(&key)
                .map(|channels| ControlResponse::Program {
                    success: true,
                    key,
                    channels,
                })
        }

        ControlRequest::GetSettings => Ok(ControlResponse::Settings {
            success: true,
            settings: engine.get_settings().await,
        }),

        ControlRequest::UpdateSettings { settings } => {
            engine
                .update_settings(settings)
                .await
                .map(|settings| ControlResponse::Settings {
                    success: true,
                    settings,
                })
        }

        ControlRequest::ResetSettings => {
            engine
                .reset_settings()
                .await
                .map(|settings| ControlResponse::Settings {
                    success: true,
                    settings,
                })
        }

        ControlRequest::StartScreensaver { mode } => engine
            .start_screensaver(mode.as_deref())
            .await
            .map(|mode| ControlResponse::Screensaver {
                success: true,
                mode: Some(mode),
            }),

        ControlRequest::StopScreensaver => {
            engine.stop_screensaver().await;
            Ok(ControlResponse::ok())
        }

        ControlRequest::GetScreensaver => Ok(ControlResponse::Screensaver {
            success: true,
            mode: engine.active_screensaver_mode().await,
        }),
    };

    result.unwrap_or_else(|error| {
        warn!(error = %error, "control request failed");
        ControlResponse::error(error)
    })
}
