//! WebSocket server for the status feed and client commands.
//!
//! Every [`SchedulerEvent`] is broadcast to all connected clients as JSON.
//! Clients may send [`ClientCommand`]s as JSON text frames; the reply goes
//! to the sending client only.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use socket2::{Domain, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use spotplug_types::{ClientCommand, SchedulerEvent};

use crate::commands::CommandHandler;

/// Bind a listener with `SO_REUSEADDR` so restarts don't wait out TIME_WAIT.
fn bind_listener(addr: &str) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", addr))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    Ok(TcpListener::from_std(socket.into())?)
}

/// Run the WebSocket server for scheduler events and commands.
pub async fn run_server(
    addr: &str,
    mut event_rx: broadcast::Receiver<SchedulerEvent>,
    handler: Arc<CommandHandler>,
) {
    let listener = match bind_listener(addr) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind server to {}: {:#}", addr, e);
            return;
        }
    };

    info!("Status WebSocket server listening on {}", addr);

    // Broadcast channel for clients
    let (client_tx, _) = broadcast::channel::<String>(256);
    let client_tx_clone = client_tx.clone();

    // Forward scheduler events to client broadcast
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        let _ = client_tx_clone.send(json);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    });

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let mut client_rx = client_tx.subscribe();
        let handler = handler.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, peer_addr, &mut client_rx, &handler).await {
                debug!("Client {} error: {}", peer_addr, e);
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    data_rx: &mut broadcast::Receiver<String>,
    handler: &CommandHandler,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    debug!("Client {} connected", peer_addr);

    // Start every client with a full snapshot.
    let snapshot = handler.handle(ClientCommand::Status).await;
    ws_sender
        .send(Message::Text(serde_json::to_string(&snapshot)?))
        .await?;

    loop {
        tokio::select! {
            // Forward data to client
            data = data_rx.recv() => {
                match data {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }

            // Commands, ping/pong and close
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(command) => handler.handle(command).await,
                            Err(e) => {
                                warn!("Invalid command from {}: {}", peer_addr, e);
                                SchedulerEvent::CommandResult {
                                    success: false,
                                    message: format!("Invalid command: {}", e),
                                }
                            }
                        };
                        if ws_sender
                            .send(Message::Text(serde_json::to_string(&reply)?))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    debug!("Client {} disconnected", peer_addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_listener_rejects_bad_address() {
        assert!(bind_listener("not-an-address").is_err());
    }

    #[tokio::test]
    async fn test_bind_listener_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0").unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }
}
