use crate::core::{ClientId, DaemonEvent};
use modelbrowser_proto::protocol::{split_frame, CodecError, ErrorReason, Event, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events queued per client before the core starts dropping them.
const OUTBOX_CAPACITY: usize = 256;

pub fn start_server(
    bind_address: String,
    port: u16,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);
        serve(listener, event_tx).await;
    })
}

async fn serve(listener: TcpListener, event_tx: mpsc::Sender<DaemonEvent>) {
    let mut client_id: ClientId = 0;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                client_id += 1;
                let id = client_id;

                let (outbox, outbox_rx) = mpsc::channel::<Event>(OUTBOX_CAPACITY);
                info!("Client {} connected from {}", id, peer);
                if event_tx
                    .send(DaemonEvent::ClientConnected { id, outbox })
                    .await
                    .is_err()
                {
                    warn!("DaemonEvent channel closed");
                    return;
                }

                let evt_tx = event_tx.clone();
                tokio::spawn(async move {
                    handle_client(stream, id, evt_tx.clone(), outbox_rx).await;
                    info!("Client {} disconnected", id);
                    let _ = evt_tx.send(DaemonEvent::ClientDisconnected { id }).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    client_id: ClientId,
    event_tx: mpsc::Sender<DaemonEvent>,
    mut outbox_rx: mpsc::Receiver<Event>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        loop {
                            let (payload, consumed) = match split_frame(&read_buf) {
                                Ok(Some(frame)) => frame,
                                Ok(None) => break,
                                Err(e) => {
                                    // No way to find the next frame boundary after a bad header.
                                    warn!("Client {} sent an unusable frame ({}), closing", client_id, e);
                                    return;
                                }
                            };
                            let decoded = Message::decode_payload(payload);
                            read_buf.drain(..consumed);

                            match decoded {
                                Ok(Message::Request(request)) => {
                                    if event_tx
                                        .send(DaemonEvent::ClientMessage { id: client_id, request })
                                        .await
                                        .is_err()
                                    {
                                        warn!("DaemonEvent channel closed");
                                        return;
                                    }
                                }
                                Ok(Message::Event(event)) => {
                                    debug!("Client {} sent event {:?}, dropping", client_id, event);
                                }
                                Err(CodecError::UnknownOpcode(tag)) => {
                                    warn!("Client {} sent unknown opcode {:?}, dropping", client_id, tag);
                                }
                                Err(e) => {
                                    warn!("Client {} sent malformed frame: {}, dropping", client_id, e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            event = outbox_rx.recv() => {
                let Some(event) = event else { break };
                if let Some(encoded) = encode_event(client_id, event) {
                    if write_half.write_all(&encoded).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Frame `event` for the wire. An event that cannot be framed (a string
/// over the u16 limit, a payload over `MAX_FRAME_LEN`) is replaced by a
/// `too_large` error so the client still gets an answer.
fn encode_event(client_id: ClientId, event: Event) -> Option<Vec<u8>> {
    let message = Message::Event(event);
    let opcode = message.opcode();
    match message.encode() {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            warn!("Reply {} for client {} does not fit a frame: {}", opcode.as_str(), client_id, e);
            let fallback = Event::error(ErrorReason::TooLarge, format!("{}: {}", opcode.as_str(), e));
            match Message::Event(fallback).encode() {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    error!("Failed to encode error reply for client {}: {}", client_id, e);
                    None
                }
            }
        }
    }
}
