use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, UdpSocket};

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind proxy on port {port}: {message}")]
    BindFailed { port: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct ProxyOption {
    pub port: u16,
    pub passthrough_ports: Vec<u16>,
}

/// Handle to the running interception proxy. The proxy's matching engine is
/// a collaborator; this handle owns only its lifecycle and published
/// addresses.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub ip4: Ipv4Addr,
    pub ip6: Ipv6Addr,
    pub port: u16,
    shutdown: watch::Sender<bool>,
}

/// The address the interception layer redirects intercepted flows to: the
/// host's outbound interface, not the loopback.
fn outbound_ip4() -> Ipv4Addr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(IpAddr::V4(ip)) => ip,
        _ => Ipv4Addr::LOCALHOST,
    }
}

/// Binds the proxy listener and parks an accept loop on a background task
/// until [`Proxy::stop`].
pub async fn boot_proxy(opt: ProxyOption) -> Result<Proxy, ProxyError> {
    let listener = TcpListener::bind(("0.0.0.0", opt.port))
        .await
        .map_err(|err| ProxyError::BindFailed {
            port: opt.port,
            message: err.to_string(),
        })?;
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(opt.port);

    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let passthrough = opt.passthrough_ports.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((_, peer)) => {
                            debug!(%peer, passthrough = ?passthrough, "proxy accepted intercepted connection");
                        }
                        Err(err) => {
                            debug!(error = %err, "proxy accept failed");
                        }
                    }
                }
            }
        }
        debug!("proxy accept loop stopped");
    });

    let proxy = Proxy {
        ip4: outbound_ip4(),
        ip6: Ipv6Addr::UNSPECIFIED,
        port,
        shutdown,
    };
    info!(ip4 = %proxy.ip4, port = proxy.port, "proxy started");
    Ok(proxy)
}

impl Proxy {
    /// Stops the accept loop. Safe to call more than once.
    pub fn stop(&self) {
        if self.shutdown.send(true).is_ok() {
            info!(port = self.port, "proxy stopped");
        }
    }
}
