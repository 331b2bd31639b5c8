//! UDP and TCP listeners feeding the forwarding engine.
mod tcp;
mod udp;

use conduit_dns_application::ForwardingEngine;
use conduit_dns_domain::config::ServerConfig;
use conduit_dns_domain::message::{DnsMessage, Flags};
use conduit_dns_domain::Rcode;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Running server: one UDP socket and one TCP listener on the same
/// address, both feeding the shared engine. Dropping the handle without
/// calling [`stop`] leaves the listener tasks running.
///
/// [`stop`]: DnsServer::stop
pub struct DnsServer {
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    in_flight: Arc<AtomicUsize>,
    shutdown_grace: Duration,
    listeners: Vec<JoinHandle<()>>,
}

impl DnsServer {
    pub async fn start(
        engine: Arc<ForwardingEngine>,
        config: &ServerConfig,
    ) -> io::Result<DnsServer> {
        let ip: IpAddr = config.bind_address.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid bind address: {}", config.bind_address),
            )
        })?;
        let bind_addr = SocketAddr::from((ip, config.port));

        let udp_socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let udp_addr = udp_socket.local_addr()?;
        // Port 0 picks distinct ports per protocol; bind TCP to whatever
        // UDP got so the two stay in step.
        let tcp_listener = TcpListener::bind(udp_addr).await?;
        let tcp_addr = tcp_listener.local_addr()?;

        let (shutdown, _) = watch::channel(false);
        let in_flight = Arc::new(AtomicUsize::new(0));

        let listeners = vec![
            tokio::spawn(udp::run(
                udp_socket,
                Arc::clone(&engine),
                shutdown.subscribe(),
                Arc::clone(&in_flight),
            )),
            tokio::spawn(tcp::run(
                tcp_listener,
                engine,
                shutdown.subscribe(),
                Arc::clone(&in_flight),
                Duration::from_secs(config.tcp_idle_timeout_secs),
            )),
        ];

        info!(%udp_addr, %tcp_addr, "listening");
        Ok(DnsServer {
            udp_addr,
            tcp_addr,
            shutdown,
            in_flight,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            listeners,
        })
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    /// Stops accepting work, waits up to the shutdown grace period for
    /// in-flight queries to drain, then tears the listeners down.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        let deadline = Instant::now() + self.shutdown_grace;
        while self.in_flight.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let abandoned = self.in_flight.load(Ordering::Acquire);
        if abandoned > 0 {
            tracing::warn!(abandoned, "shutdown grace elapsed with queries in flight");
        }

        for listener in &self.listeners {
            listener.abort();
        }
        for listener in self.listeners {
            let _ = listener.await;
        }
        info!("server stopped");
    }
}

/// Counts a request from spawn to completion, however the task exits.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Minimal FORMERR reply for a message we could not decode past the
/// header. No question section to echo.
fn formerr(id: u16) -> DnsMessage {
    DnsMessage {
        id,
        flags: Flags {
            response: true,
            rcode: Rcode::FormErr,
            ..Flags::default()
        },
        questions: Vec::new(),
        answers: Vec::new(),
        authorities: Vec::new(),
        additionals: Vec::new(),
    }
}
