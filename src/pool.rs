use crate::{
    envelopes::Envelope, filter::matches_any, normalize_urls, relay::Relay, Event, Filter, ID,
};
use dashmap::DashSet;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::{sync::mpsc, time::Instant};
use url::Url;

/// upper bound for sending CLOSE and closing the socket once a relay is done
const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// a relay that contributed nothing because it could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    pub url: String,
    pub reason: String,
}

/// merged result of one query across many relays
#[derive(Debug, Default)]
pub struct QueryOutcome {
    /// unique by id, in arrival order
    pub events: Vec<Event>,
    pub failures: Vec<RelayFailure>,
    /// relays a connection was opened to
    pub reached: Vec<Url>,
}

impl QueryOutcome {
    /// true when not a single relay could be reached, so an empty result means nothing
    pub fn all_failed(&self) -> bool {
        self.reached.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStatus {
    pub url: String,
    pub reachable: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
enum Occurrence {
    Reached(Url),
    Event(Event),
    Failed(RelayFailure),
}

/// runs ephemeral subscriptions against many relays at once; every call opens its own
/// connections and closes them before returning
#[derive(Debug, Clone, Default)]
pub struct Pool {
    serial: Arc<AtomicU64>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_subscription_id(&self) -> String {
        format!("q-{}", self.serial.fetch_add(1, Ordering::Relaxed))
    }

    /// query every relay with one filter, stopping each at EOSE or when `timeout` elapses
    pub async fn query<S: AsRef<str>>(
        &self,
        urls: &[S],
        filter: Filter,
        timeout: Duration,
    ) -> QueryOutcome {
        self.query_filters(urls, vec![filter], timeout).await
    }

    /// like `query`, but sends all filters in a single REQ; an event matching any of them is kept
    pub async fn query_filters<S: AsRef<str>>(
        &self,
        urls: &[S],
        filters: Vec<Filter>,
        timeout: Duration,
    ) -> QueryOutcome {
        let deadline = Instant::now() + timeout;
        let (valid, invalid) = normalize_urls(urls);

        let mut outcome = QueryOutcome {
            events: Vec::with_capacity(filters.iter().filter_map(|f| f.limit).sum::<usize>().min(500)),
            failures: invalid
                .into_iter()
                .map(|(url, err)| RelayFailure {
                    url,
                    reason: err.to_string(),
                })
                .collect(),
            reached: Vec::with_capacity(valid.len()),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let seen = Arc::new(DashSet::<ID>::new());
        let filters = Arc::new(filters);

        for url in valid {
            let tx = tx.clone();
            let seen = seen.clone();
            let filters = filters.clone();
            let subscription_id = self.next_subscription_id();

            tokio::spawn(async move {
                query_relay(url, subscription_id, filters, deadline, seen, tx).await;
            });
        }
        drop(tx);

        while let Some(occ) = rx.recv().await {
            match occ {
                Occurrence::Reached(url) => outcome.reached.push(url),
                Occurrence::Event(event) => outcome.events.push(event),
                Occurrence::Failed(failure) => outcome.failures.push(failure),
            }
        }

        outcome
    }

    /// connect to each relay and close again, reporting which ones answered
    pub async fn probe<S: AsRef<str>>(&self, urls: &[S], timeout: Duration) -> Vec<RelayStatus> {
        let deadline = Instant::now() + timeout;
        let (valid, invalid) = normalize_urls(urls);

        let mut statuses: Vec<RelayStatus> = invalid
            .into_iter()
            .map(|(url, err)| RelayStatus {
                url,
                reachable: false,
                error: Some(err.to_string()),
            })
            .collect();

        let probes = valid.into_iter().map(|url| async move {
            match Relay::connect(&url, deadline).await {
                Ok(mut relay) => {
                    relay.close().await;
                    RelayStatus {
                        url: url.to_string(),
                        reachable: true,
                        error: None,
                    }
                }
                Err(err) => {
                    log::info!("[{}] probe failed: {}", url, err);
                    RelayStatus {
                        url: url.to_string(),
                        reachable: false,
                        error: Some(err.to_string()),
                    }
                }
            }
        });

        let mut reached = futures::future::join_all(probes).await;
        reached.append(&mut statuses);
        reached
    }
}

async fn query_relay(
    url: Url,
    subscription_id: String,
    filters: Arc<Vec<Filter>>,
    deadline: Instant,
    seen: Arc<DashSet<ID>>,
    tx: mpsc::UnboundedSender<Occurrence>,
) {
    let mut relay = match Relay::connect(&url, deadline).await {
        Ok(relay) => relay,
        Err(err) => {
            log::info!("[{}] unreachable: {}", url, err);
            let _ = tx.send(Occurrence::Failed(RelayFailure {
                url: url.to_string(),
                reason: err.to_string(),
            }));
            return;
        }
    };
    let _ = tx.send(Occurrence::Reached(url.clone()));

    let req = Envelope::Req {
        subscription_id: subscription_id.clone(),
        filters: filters.as_ref().clone(),
    };

    if let Err(err) = relay.send(&req).await {
        log::warn!("[{}] failed to fire subscription: {}", url, err);
        let _ = tx.send(Occurrence::Failed(RelayFailure {
            url: url.to_string(),
            reason: err.to_string(),
        }));
        relay.close().await;
        return;
    }

    loop {
        let message = match tokio::time::timeout_at(deadline, relay.next_message()).await {
            Err(_) => {
                log::info!("[{}] timed out before EOSE", url);
                break;
            }
            Ok(Err(err)) => {
                log::info!("[{}] connection error: {}", url, err);
                let _ = tx.send(Occurrence::Failed(RelayFailure {
                    url: url.to_string(),
                    reason: err.to_string(),
                }));
                break;
            }
            Ok(Ok(None)) => {
                log::info!("[{}] connection ended before EOSE", url);
                let _ = tx.send(Occurrence::Failed(RelayFailure {
                    url: url.to_string(),
                    reason: "connection ended before EOSE".to_string(),
                }));
                break;
            }
            Ok(Ok(Some(message))) => message,
        };

        match message {
            Envelope::InEvent {
                subscription_id: sub_id,
                event,
            } if sub_id == subscription_id => {
                if !matches_any(&filters, &event) {
                    log::debug!("[{}] event {} does not match the filter", url, event.id);
                    continue;
                }
                if let Err(err) = event.verify() {
                    log::warn!("[{}] dropping invalid event {}: {}", url, event.id, err);
                    continue;
                }
                if seen.insert(event.id) && tx.send(Occurrence::Event(event)).is_err() {
                    // receiver dropped
                    break;
                }
            }
            Envelope::Eose(sub_id) if sub_id == subscription_id => break,
            Envelope::Closed {
                subscription_id: sub_id,
                reason,
            } if sub_id == subscription_id => {
                log::info!("[{}] subscription closed: {}", url, reason);
                break;
            }
            Envelope::Notice(notice) => {
                log::info!("[{}] received notice: {}", url, notice);
            }
            other => {
                log::debug!("[{}] ignoring {} message", url, other.label());
            }
        }
    }

    // release the subscription and the socket on every path
    let teardown = async {
        if !relay.is_closed() {
            let _ = relay.send(&Envelope::Close(subscription_id)).await;
        }
        relay.close().await;
    };
    if tokio::time::timeout(TEARDOWN_GRACE, teardown).await.is_err() {
        log::debug!("[{}] teardown timed out", url);
    }
}
