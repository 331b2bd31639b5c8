use super::{formerr, InFlightGuard};
use conduit_dns_application::ForwardingEngine;
use conduit_dns_domain::wire;
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

pub(super) async fn run(
    listener: TcpListener,
    engine: Arc<ForwardingEngine>,
    mut shutdown: watch::Receiver<bool>,
    in_flight: Arc<AtomicUsize>,
    idle_timeout: Duration,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        warn!(%error, "tcp accept failed");
                        continue;
                    }
                };
                trace!(%peer, "tcp connection accepted");
                let engine = Arc::clone(&engine);
                let in_flight = Arc::clone(&in_flight);
                let shutdown = shutdown.clone();
                tokio::spawn(serve_connection(
                    stream,
                    peer,
                    engine,
                    shutdown,
                    in_flight,
                    idle_timeout,
                ));
            }
        }
    }
}

/// One task per connection, one task per in-flight message. Messages on
/// the same connection are pipelined; the write half is shared behind a
/// lock so responses are framed atomically even when they complete out of
/// order.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    engine: Arc<ForwardingEngine>,
    mut shutdown: watch::Receiver<bool>,
    in_flight: Arc<AtomicUsize>,
    idle_timeout: Duration,
) {
    if let Err(error) = stream.set_nodelay(true) {
        debug!(%peer, %error, "set_nodelay failed");
    }
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));

    loop {
        let mut len_buf = [0u8; 2];
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            read = timeout(idle_timeout, reader.read_exact(&mut len_buf)) => {
                match read {
                    Err(_) => {
                        trace!(%peer, "closing idle tcp connection");
                        return;
                    }
                    Ok(Err(_)) => return,
                    Ok(Ok(_)) => {}
                }
            }
        }

        let frame_len = u16::from_be_bytes(len_buf) as usize;
        let mut frame = vec![0u8; frame_len];
        match timeout(idle_timeout, reader.read_exact(&mut frame)).await {
            Err(_) | Ok(Err(_)) => return,
            Ok(Ok(_)) => {}
        }

        let guard = InFlightGuard::enter(&in_flight);
        let engine = Arc::clone(&engine);
        let writer = Arc::clone(&writer);
        tokio::spawn(async move {
            handle_frame(engine, writer, frame, peer).await;
            drop(guard);
        });
    }
}

async fn handle_frame(
    engine: Arc<ForwardingEngine>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    frame: Vec<u8>,
    peer: SocketAddr,
) {
    let response = match wire::decode(&frame) {
        Ok(query) => engine.handle_query(&query).await,
        Err(error) => {
            trace!(%peer, %error, "undecodable query");
            let Some(id) = wire::salvage_id(&frame) else {
                return;
            };
            formerr(id)
        }
    };

    let bytes = match wire::encode(&response) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(%peer, %error, "failed to encode response");
            return;
        }
    };
    let Ok(len) = u16::try_from(bytes.len()) else {
        warn!(%peer, size = bytes.len(), "response exceeds tcp frame limit");
        return;
    };

    let mut framed = Vec::with_capacity(bytes.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&bytes);

    let mut writer = writer.lock().await;
    if let Err(error) = writer.write_all(&framed).await {
        debug!(%peer, %error, "tcp write failed");
    }
}
