//! Decision event stream over WebSocket.
//!
//! On connect the subscriber first receives a `snapshot` message (current
//! aggregate summary plus the most recent decisions), then live `traffic`
//! messages as requests are decided, with a `summary` message interleaved
//! every few seconds. Delivery is best-effort: a subscriber that cannot
//! keep up loses its oldest pending events, never stalls the request path.

use crate::services::events::{DecisionHub, StreamMessage};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt;
use log::debug;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};

/// WebSocket handler feeding decision events to one subscriber.
pub async fn events_ws(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<Arc<DecisionHub>>,
) -> Result<HttpResponse, Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    let (snapshot, mut receiver) = hub.subscribe();
    let mut sender_session = session.clone();

    actix_web::rt::spawn(async move {
        if let Ok(text) = serde_json::to_string(&snapshot) {
            if sender_session.text(text).await.is_err() {
                return;
            }
        }

        let mut summary_ticker = interval(Duration::from_secs(5));
        summary_ticker.tick().await; // immediate first tick; snapshot covered it

        loop {
            tokio::select! {
                received = receiver.recv() => {
                    let message = match received {
                        Ok(message) => message,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("event subscriber lagged, {} events dropped", skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    match serde_json::to_string(&message) {
                        Ok(text) => {
                            if sender_session.text(text).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!("event serialization failed: {}", e),
                    }
                }
                _ = summary_ticker.tick() => {
                    let summary = StreamMessage::Summary(hub.summary());
                    match serde_json::to_string(&summary) {
                        Ok(text) => {
                            if sender_session.text(text).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!("summary serialization failed: {}", e),
                    }
                }
            }
        }
    });

    // Keepalive and close handling.
    actix_web::rt::spawn(async move {
        while let Some(Ok(msg)) = msg_stream.next().await {
            match msg {
                Message::Ping(bytes) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Message::Close(reason) => {
                    let _ = session.close(reason).await;
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(response)
}

/// Configures the event stream route.
pub fn configure_stream(cfg: &mut web::ServiceConfig) {
    cfg.route("/events/ws", web::get().to(events_ws));
}
