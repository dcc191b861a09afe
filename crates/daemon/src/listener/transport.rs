// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport: accepts connections, gives each its own reader
//! loop and a dedicated writer task fed by a bounded mpsc channel (send-
//! side serialization — see the connection registry's doc comment).

use std::sync::Arc;

use foreman_core::Clock;
use foreman_wire::{read_frame, write_frame, Envelope};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{self, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::connection::Role;
use super::router::{Outcome, Router};

const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

pub async fn serve<C: Clock + 'static>(
    listen_addr: &str,
    router: Arc<Router<C>>,
    auth_token: Option<Arc<str>>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "listening for connections");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let router = router.clone();
                let shutdown = shutdown.clone();
                let auth_token = auth_token.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, router, auth_token, shutdown).await {
                        tracing::debug!(%peer_addr, %err, "connection ended with error");
                    }
                });
            }
        }
    }
}

/// Checks the `Authorization: Bearer <token>` header during the WS
/// upgrade handshake. This is ambient transport hygiene, not the
/// distilled spec's (out of scope) authentication model.
fn check_bearer_token(
    request: &Request,
    response: Response,
    expected: &str,
) -> Result<Response, ErrorResponse> {
    let provided = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected) {
        Ok(response)
    } else {
        let rejection = http::Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .body(None::<String>)
            .expect("static response is always well-formed");
        Err(rejection)
    }
}

async fn handle_connection<C: Clock>(
    stream: TcpStream,
    router: Arc<Router<C>>,
    auth_token: Option<Arc<str>>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = match auth_token {
        Some(expected) => {
            tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, resp: Response| {
                check_bearer_token(req, resp, expected.as_ref())
            })
            .await?
        }
        None => tokio_tungstenite::accept_async(stream).await?,
    };
    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<Envelope>(OUTBOUND_CHANNEL_CAPACITY);

    let writer_shutdown = shutdown.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_shutdown.cancelled() => break,
                next = rx.recv() => {
                    let Some(envelope) = next else { break };
                    let bytes = match write_frame(&envelope) {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            tracing::warn!(%err, "failed to encode outbound envelope");
                            continue;
                        }
                    };
                    if write.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut role: Option<Role> = None;
    while let Some(msg) = read.next().await {
        let msg = msg?;
        let bytes: &[u8] = match &msg {
            Message::Text(t) => t.as_bytes(),
            Message::Binary(b) => b,
            Message::Close(_) => break,
            _ => continue,
        };
        let envelope = match read_frame(bytes) {
            Ok(e) => e,
            Err(err) => {
                tracing::debug!(%err, "dropping malformed envelope");
                continue;
            }
        };

        match &role {
            None => {
                role = router.handle_first(envelope, tx.clone()).await;
                if role.is_none() {
                    break;
                }
            }
            Some(Role::Client { job_id }) => {
                if matches!(router.handle_client(job_id, envelope).await, Outcome::Close) {
                    break;
                }
            }
            Some(Role::Worker { worker_id }) => {
                router.handle_worker(worker_id, envelope).await;
            }
        }
    }

    match &role {
        Some(Role::Client { job_id }) => router.on_client_disconnect(job_id),
        Some(Role::Worker { worker_id }) => router.on_worker_disconnect(worker_id).await,
        None => {}
    }

    writer.abort();
    Ok(())
}
