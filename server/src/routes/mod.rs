use rocket::{
    State,
    futures::{SinkExt, StreamExt},
    get,
    http::Status,
    serde::json::Json,
};
use rocket_ws::{Channel, Message, WebSocket};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use mines_common::{
    models::GameParams,
    protocol::{ClientMessage, ServerMessage},
};

use crate::{
    config::Settings,
    controller::BoardController,
    rate_limit::{ClientIp, GameQuota, RateLimiter},
};

/// Handles one text frame. Malformed frames are logged and skipped, and a
/// restart only goes ahead if the client still has a game to spend.
pub async fn handle_frame(
    controller: &mut BoardController,
    quota: &GameQuota,
    session: Uuid,
    text: &str,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                "Invalid message format in session {}: {} - Error: {}",
                session, text, e
            );
            return;
        }
    };
    debug!("Session {} received {:?}", session, message);

    if matches!(message, ClientMessage::Restart { .. }) && quota.take().is_err() {
        warn!("Session {} restarted too often, keeping the current game", session);
        return;
    }
    controller.handle(message).await;
}

/// Board size and mine count used when the browser asks for nothing else.
#[get("/defaults")]
pub fn defaults(settings: &State<Settings>) -> Json<GameParams> {
    Json(settings.params)
}

/// Hosts one board per connection. Query parameters override the configured
/// board size and mine count.
#[get("/ws?<rows>&<columns>&<mines>")]
#[instrument(level = "trace", skip(ws, settings, rate_limiter, client_ip), fields(client_ip = %client_ip.0))]
pub fn board_socket(
    ws: WebSocket,
    rows: Option<usize>,
    columns: Option<usize>,
    mines: Option<usize>,
    settings: &State<Settings>,
    rate_limiter: &State<RateLimiter>,
    client_ip: ClientIp,
) -> Result<Channel<'static>, Status> {
    let quota = GameQuota::new(
        rate_limiter.inner().clone(),
        client_ip.0,
        settings.games_per_minute,
    );
    quota.take()?;

    let params = GameParams {
        rows: rows.unwrap_or(settings.params.rows),
        columns: columns.unwrap_or(settings.params.columns),
        mines: mines.unwrap_or(settings.params.mines),
    };
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut controller =
        BoardController::new(params, settings, outbound).map_err(|e| {
            warn!("Rejecting board for {}: {}", client_ip.0, e);
            Status::BadRequest
        })?;

    let session = Uuid::new_v4();
    info!(
        "Session {} opened for {}: {}x{} with {} mines",
        session, client_ip.0, params.rows, params.columns, params.mines
    );

    Ok(ws.channel(move |stream| {
        Box::pin(async move {
            let (mut write, mut read) = stream.split();

            let writer = tokio::spawn(async move {
                while let Some(message) = outbound_rx.recv().await {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        debug!("Session {} writer stopped: {}", session, e);
                        break;
                    }
                }
                let _ = write.close().await;
            });

            controller.start();

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        handle_frame(&mut controller, &quota, session, &text).await;
                    }
                    Ok(Message::Close(_)) => {
                        info!("Session {} closed by client", session);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error in session {}: {}", session, e);
                        break;
                    }
                    _ => {
                        debug!("Ignoring non-text frame in session {}", session);
                    }
                }
            }

            // dropping the controller stops the clock and closes the outbound channel
            drop(controller);
            let _ = writer.await;

            info!("Session {} ended", session);
            Ok(())
        })
    }))
}
