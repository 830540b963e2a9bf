//! Censorship localization from a finished path probe.

use super::syn::{SynProber, SynReply, TcpConnectProber};
use super::types::{BlockingClass, CensorshipLocalization, PathProbeResult, TerminationReason};
use crate::config::Settings;
use crate::geo::{Geolocator, TieredGeolocator};
use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

/// Upper bound on hops probed with SYN per localization.
const MAX_SYN_TARGETS: usize = 32;

/// Localizations run at once by [`Localizer::localize_all`] unless configured.
const DEFAULT_CONCURRENCY: usize = 8;

/// Turns a [`PathProbeResult`] into a [`CensorshipLocalization`].
#[derive(Clone)]
pub struct Localizer {
    geo: Arc<dyn Geolocator>,
    syn: Option<Arc<dyn SynProber>>,
    concurrency: usize,
}

impl Localizer {
    /// Create a localizer. Pass `None` for `syn` to skip handshake probing.
    #[must_use]
    pub fn new(geo: Arc<dyn Geolocator>, syn: Option<Arc<dyn SynProber>>) -> Self {
        Self {
            geo,
            syn,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Limit how many localizations `localize_all` runs at the same time.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Tiered geolocation and TCP connect probing from settings.
    #[must_use]
    pub fn from_settings(settings: &Settings, syn_probing: bool) -> Self {
        let syn: Option<Arc<dyn SynProber>> = syn_probing.then(|| {
            Arc::new(TcpConnectProber::new(settings.trace.syn_port, settings.trace.syn_timeout())) as Arc<dyn SynProber>
        });
        Self::new(Arc::new(TieredGeolocator::from_settings(&settings.geo)), syn)
            .with_concurrency(settings.trace.concurrency)
    }

    /// Classify where the path stopped and locate the last hop that answered.
    ///
    /// Never fails: geolocation and SYN probing problems only leave their fields empty.
    pub async fn localize(&self, result: &PathProbeResult) -> CensorshipLocalization {
        let last_hop = result.last_responsive_hop();
        let mut record = CensorshipLocalization {
            domain: result.domain.clone(),
            timestamp: Utc::now(),
            last_responsive_hop: last_hop,
            location: None,
            location_error: None,
            rst_detected: false,
            redirection_detected: false,
            classification: BlockingClass::ProbeFailed,
        };

        if result.reached_destination {
            record.classification = BlockingClass::NoBlockingDetected;
            tracing::info!("{}: destination reached", result.domain);
            return record;
        }

        let Some(hop) = last_hop.filter(|_| result.termination_reason != TerminationReason::CommandFailure) else {
            record.last_responsive_hop = None;
            tracing::info!("{}: no usable hops ({})", result.domain, result.termination_reason);
            return record;
        };

        record.classification = if result.destination_address.is_some() {
            BlockingClass::BlockedAtHop
        } else {
            BlockingClass::DestinationUnreachable
        };

        let (location, (rst, redirected)) = tokio::join!(self.geo.locate(hop), self.syn_signals(result));
        match location {
            Ok(location) => record.location = Some(location),
            Err(e) => {
                tracing::warn!("{}: could not locate hop {hop}: {e}", result.domain);
                record.location_error = Some(e.to_string());
            }
        }
        record.rst_detected = rst;
        record.redirection_detected = redirected;

        tracing::info!(
            "{}: {} at {hop} (rst={rst}, redirected={redirected})",
            result.domain,
            record.classification
        );
        record
    }

    /// Localize several results through a bounded pool, in input order.
    pub async fn localize_all(&self, results: &[PathProbeResult]) -> Vec<CensorshipLocalization> {
        stream::iter(results)
            .map(|result| self.localize(result))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn syn_signals(&self, result: &PathProbeResult) -> (bool, bool) {
        let Some(syn) = &self.syn else {
            return (false, false);
        };

        let targets: BTreeSet<IpAddr> = result
            .hops
            .iter()
            .filter_map(|hop| hop.address)
            .filter(|addr| Some(*addr) != result.destination_address)
            .collect();

        let replies = join_all(targets.into_iter().take(MAX_SYN_TARGETS).map(|target| async move {
            syn.probe(target).await.map(|reply| (target, reply))
        }))
        .await;

        signals(replies.into_iter().flatten(), result.destination_address)
    }
}

impl std::fmt::Debug for Localizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Localizer")
            .field("syn", &self.syn.is_some())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// Fold (probed, reply) pairs into the RST and redirection flags.
fn signals(replies: impl Iterator<Item = (IpAddr, SynReply)>, destination: Option<IpAddr>) -> (bool, bool) {
    replies.fold((false, false), |(rst, redirected), (probed, reply)| {
        (
            rst || (reply.reset && Some(reply.responder) != destination),
            redirected || reply.responder != probed,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoError;
    use crate::geo::GeoLocation;
    use crate::trace::types::TraceHop;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockGeo {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Geolocator for MockGeo {
        async fn locate(&self, _ip: IpAddr) -> Result<GeoLocation, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GeoError::NotFoundLocally)
            } else {
                Ok(GeoLocation::from_parts(Some("China".into()), Some("Beijing".into()), Some("Beijing".into())))
            }
        }
    }

    #[derive(Default)]
    struct MockSyn {
        replies: HashMap<IpAddr, SynReply>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SynProber for MockSyn {
        async fn probe(&self, target: IpAddr) -> Option<SynReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.get(&target).copied()
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn truncated() -> PathProbeResult {
        let hops = vec![
            TraceHop::silent(1),
            TraceHop::new(2, Some(ip("5.6.7.8"))),
            TraceHop::silent(3),
            TraceHop::silent(4),
        ];
        PathProbeResult::from_hops("blocked.example", hops, Some(ip("9.9.9.9")), false, false, false)
    }

    #[tokio::test]
    async fn test_blocked_at_hop() {
        let geo = Arc::new(MockGeo::default());
        let localizer = Localizer::new(geo.clone(), None);

        let record = localizer.localize(&truncated()).await;
        assert_eq!(record.classification, BlockingClass::BlockedAtHop);
        assert_eq!(record.last_responsive_hop, Some(ip("5.6.7.8")));
        assert_eq!(record.location.unwrap().country, "China");
        assert_eq!(geo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reached_destination_skips_geolocation() {
        let geo = Arc::new(MockGeo::default());
        let syn = Arc::new(MockSyn::default());
        let localizer = Localizer::new(geo.clone(), Some(syn.clone()));

        let hops = vec![TraceHop::new(1, Some(ip("10.0.0.1"))), TraceHop::new(2, Some(ip("9.9.9.9")))];
        let result = PathProbeResult::from_hops("ok.example", hops, Some(ip("9.9.9.9")), false, false, false);

        let record = localizer.localize(&result).await;
        assert_eq!(record.classification, BlockingClass::NoBlockingDetected);
        assert!(record.location.is_none());
        assert_eq!(geo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(syn.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_usable_hops() {
        let geo = Arc::new(MockGeo::default());
        let localizer = Localizer::new(geo.clone(), None);

        let silent = PathProbeResult::from_hops(
            "dark.example",
            vec![TraceHop::silent(1), TraceHop::silent(2)],
            Some(ip("9.9.9.9")),
            false,
            true,
            false,
        );
        let record = localizer.localize(&silent).await;
        assert_eq!(record.classification, BlockingClass::ProbeFailed);
        assert!(record.last_responsive_hop.is_none());

        let failed = PathProbeResult::command_failure("dark.example", None, false);
        assert_eq!(localizer.localize(&failed).await.classification, BlockingClass::ProbeFailed);
        assert_eq!(geo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unresolved_destination() {
        let localizer = Localizer::new(Arc::new(MockGeo::default()), None);
        let hops = vec![TraceHop::new(1, Some(ip("10.0.0.1"))), TraceHop::silent(2)];
        let result = PathProbeResult::from_hops("gone.example", hops, None, false, false, false);

        let record = localizer.localize(&result).await;
        assert_eq!(record.classification, BlockingClass::DestinationUnreachable);
        assert_eq!(record.last_responsive_hop, Some(ip("10.0.0.1")));
    }

    #[tokio::test]
    async fn test_geolocation_failure_keeps_classification() {
        let geo = Arc::new(MockGeo {
            fail: true,
            ..MockGeo::default()
        });
        let record = Localizer::new(geo, None).localize(&truncated()).await;
        assert_eq!(record.classification, BlockingClass::BlockedAtHop);
        assert!(record.location.is_none());
        assert!(record.location_error.is_some());
    }

    #[tokio::test]
    async fn test_syn_signals() {
        let mut replies = HashMap::new();
        replies.insert(
            ip("5.6.7.8"),
            SynReply {
                responder: ip("5.6.7.8"),
                reset: true,
            },
        );
        let syn = Arc::new(MockSyn {
            replies,
            ..MockSyn::default()
        });
        let record = Localizer::new(Arc::new(MockGeo::default()), Some(syn.clone()))
            .localize(&truncated())
            .await;
        assert!(record.rst_detected);
        assert!(!record.redirection_detected);
        assert_eq!(syn.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_folding() {
        let dest = Some(ip("9.9.9.9"));
        let redirected = [(
            ip("5.6.7.8"),
            SynReply {
                responder: ip("1.1.1.1"),
                reset: false,
            },
        )];
        assert_eq!(signals(redirected.into_iter(), dest), (false, true));

        let dest_reset = [(
            ip("5.6.7.8"),
            SynReply {
                responder: ip("9.9.9.9"),
                reset: true,
            },
        )];
        assert_eq!(signals(dest_reset.into_iter(), dest), (false, true));
        assert_eq!(signals(std::iter::empty(), dest), (false, false));
    }

    /// Geolocator that records how many lookups overlap.
    #[derive(Default)]
    struct GaugeGeo {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Geolocator for GaugeGeo {
        async fn locate(&self, _ip: IpAddr) -> Result<GeoLocation, GeoError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Err(GeoError::NotFoundLocally)
        }
    }

    #[tokio::test]
    async fn test_localize_all_is_bounded_and_ordered() {
        let geo = Arc::new(GaugeGeo::default());
        let localizer = Localizer::new(geo.clone(), None).with_concurrency(3);

        let results: Vec<PathProbeResult> = (0..40)
            .map(|i| {
                let mut result = truncated();
                result.domain = format!("d{i}.example");
                result
            })
            .collect();

        let records = localizer.localize_all(&results).await;
        assert_eq!(records.len(), 40);
        assert!(records.iter().zip(&results).all(|(rec, res)| rec.domain == res.domain));
        let peak = geo.peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak concurrency {peak}");
    }
}
