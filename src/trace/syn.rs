//! TCP handshake probing of hop addresses.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

/// What came back from a handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynReply {
    /// Address that answered
    pub responder: IpAddr,
    /// The answer was a reset
    pub reset: bool,
}

/// Sends one SYN-class probe to an address.
#[async_trait]
pub trait SynProber: Send + Sync {
    /// Probe `target`. `None` when nothing answered within the timeout.
    async fn probe(&self, target: IpAddr) -> Option<SynReply>;
}

/// Prober built on an ordinary TCP connect.
///
/// A refused or reset connect is reported as a reset from the target. A completed
/// handshake always reports the target itself: the kernel only completes a connect
/// with the address it was sent to, so this prober never signals redirection.
/// Detecting a foreign responder needs raw packet capture.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnectProber {
    port: u16,
    timeout: Duration,
}

impl TcpConnectProber {
    #[must_use]
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl SynProber for TcpConnectProber {
    async fn probe(&self, target: IpAddr) -> Option<SynReply> {
        let addr = SocketAddr::new(target, self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                tracing::debug!("SYN to {addr} answered");
                Some(SynReply {
                    responder: target,
                    reset: false,
                })
            }
            Ok(Err(e)) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset) => {
                tracing::debug!("SYN to {addr} reset");
                Some(SynReply {
                    responder: target,
                    reset: true,
                })
            }
            Ok(Err(e)) => {
                tracing::debug!("SYN to {addr} failed: {e}");
                None
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoError;
    use crate::geo::{GeoLocation, Geolocator};
    use crate::trace::{Localizer, PathProbeResult, TraceHop};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let prober = TcpConnectProber::new(port, Duration::from_secs(2));
        let target: IpAddr = "127.0.0.1".parse().unwrap();
        let reply = prober.probe(target).await.unwrap();
        assert!(!reply.reset);
        assert_eq!(reply.responder, target);
        let _ = accept.await;
    }

    #[tokio::test]
    async fn test_connect_prober_never_flags_redirection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let hops = vec![
            TraceHop::new(1, Some("127.0.0.1".parse().unwrap())),
            TraceHop::silent(2),
        ];
        let result = PathProbeResult::from_hops("x.example", hops, Some("9.9.9.9".parse().unwrap()), false, false, false);
        let localizer = Localizer::new(
            Arc::new(GeoUnavailable),
            Some(Arc::new(TcpConnectProber::new(port, Duration::from_secs(2)))),
        );

        let record = localizer.localize(&result).await;
        assert!(!record.redirection_detected);
        assert!(!record.rst_detected);
        let _ = accept.await;
    }

    struct GeoUnavailable;

    #[async_trait]
    impl Geolocator for GeoUnavailable {
        async fn locate(&self, _ip: IpAddr) -> Result<GeoLocation, GeoError> {
            Err(GeoError::NotFoundLocally)
        }
    }

    #[tokio::test]
    async fn test_closed_port_is_reset() {
        // bind then drop to get a port that is very likely closed
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let prober = TcpConnectProber::new(port, Duration::from_secs(2));
        let reply = prober.probe("127.0.0.1".parse().unwrap()).await.unwrap();
        assert!(reply.reset);
    }
}
