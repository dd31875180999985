//! an in-process relay for tests: serves stored events, answers publishes with a
//! scripted OK and counts the connections that went away

use crate::{
    envelopes::{parse_message, Envelope},
    Event, EventTemplate, Filter, Kind, SecretKey, Tags, Timestamp, ID,
};
use futures::{SinkExt, StreamExt};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use url::Url;

pub(crate) fn signed_event(
    sk: &SecretKey,
    kind: Kind,
    tags: Tags,
    content: &str,
    created_at: u64,
) -> Event {
    EventTemplate::new(kind, tags, content, Timestamp(created_at), sk.pubkey())
        .sign(sk)
        .unwrap()
}

/// a url nothing listens on
pub(crate) async fn unreachable_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("ws://{}", addr)).unwrap()
}

#[derive(Debug, Clone)]
pub(crate) enum OkPolicy {
    Accept,
    Reject(String),
    Silent,
}

struct FixtureState {
    events: Mutex<Vec<Event>>,
    published: Mutex<Vec<Event>>,
    close_messages: Mutex<Vec<String>>,
    ok_policy: Mutex<OkPolicy>,
    answer_reqs: AtomicBool,
    drop_after_events: AtomicBool,
    reqs: AtomicUsize,
    closed: AtomicUsize,
}

pub(crate) struct FixtureRelay {
    addr: SocketAddr,
    state: Arc<FixtureState>,
}

impl FixtureRelay {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(FixtureState {
            events: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            close_messages: Mutex::new(Vec::new()),
            ok_policy: Mutex::new(OkPolicy::Accept),
            answer_reqs: AtomicBool::new(true),
            drop_after_events: AtomicBool::new(false),
            reqs: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, accept_state.clone()));
            }
        });

        Self { addr, state }
    }

    pub(crate) fn url(&self) -> Url {
        Url::parse(&format!("ws://{}", self.addr)).unwrap()
    }

    pub(crate) fn add_events(&self, events: Vec<Event>) {
        self.state.events.lock().unwrap().extend(events);
    }

    pub(crate) fn set_ok_policy(&self, policy: OkPolicy) {
        *self.state.ok_policy.lock().unwrap() = policy;
    }

    /// when false, REQs are swallowed without events or EOSE
    pub(crate) fn set_answer_reqs(&self, answer: bool) {
        self.state.answer_reqs.store(answer, Ordering::SeqCst);
    }

    /// when true, a REQ gets its events and then the socket is dropped without EOSE
    pub(crate) fn set_drop_after_events(&self, drop: bool) {
        self.state.drop_after_events.store(drop, Ordering::SeqCst);
    }

    pub(crate) fn published(&self) -> Vec<Event> {
        self.state.published.lock().unwrap().clone()
    }

    pub(crate) fn close_messages(&self) -> Vec<String> {
        self.state.close_messages.lock().unwrap().clone()
    }

    pub(crate) fn req_count(&self) -> usize {
        self.state.reqs.load(Ordering::SeqCst)
    }

    pub(crate) fn closed_connections(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// wait until at least `n` connections have gone away
    pub(crate) async fn wait_closed(&self, n: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.closed_connections() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "expected {} closed connections, saw {}",
            n,
            self.closed_connections()
        );
    }
}

/// stored events answering a REQ, newest first, each filter capped by its limit
fn select(events: &[Event], filters: &[Filter]) -> Vec<Event> {
    let mut sorted = events.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut seen: Vec<ID> = Vec::new();
    let mut selected = Vec::new();
    for filter in filters {
        let matching = sorted
            .iter()
            .filter(|e| filter.matches(e))
            .take(filter.limit.unwrap_or(usize::MAX));
        for event in matching {
            if !seen.contains(&event.id) {
                seen.push(event.id);
                selected.push(event.clone());
            }
        }
    }
    selected
}

async fn serve(stream: TcpStream, state: Arc<FixtureState>) {
    let Ok(mut ws) = accept_async(stream).await else {
        state.closed.fetch_add(1, Ordering::SeqCst);
        return;
    };

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else {
            continue;
        };

        let replies = match parse_message(&text) {
            Ok(Envelope::Req {
                subscription_id,
                filters,
            }) => {
                state.reqs.fetch_add(1, Ordering::SeqCst);
                if !state.answer_reqs.load(Ordering::SeqCst) {
                    continue;
                }
                let events = state.events.lock().unwrap().clone();
                let mut replies: Vec<Envelope> = select(&events, &filters)
                    .into_iter()
                    .map(|event| Envelope::InEvent {
                        subscription_id: subscription_id.clone(),
                        event,
                    })
                    .collect();
                if state.drop_after_events.load(Ordering::SeqCst) {
                    for reply in replies {
                        let _ = ws.send(Message::text(reply.to_json().unwrap())).await;
                    }
                    break;
                }
                replies.push(Envelope::Eose(subscription_id));
                replies
            }
            Ok(Envelope::Close(subscription_id)) => {
                state.close_messages.lock().unwrap().push(subscription_id);
                continue;
            }
            Ok(Envelope::OutEvent(event)) => {
                state.published.lock().unwrap().push(event.clone());
                let policy = state.ok_policy.lock().unwrap().clone();
                match policy {
                    OkPolicy::Accept => vec![
                        // noise a client has to skip
                        Envelope::Notice("welcome".into()),
                        Envelope::Ok {
                            event_id: ID::from_bytes([0u8; 32]),
                            ok: false,
                            reason: "error: some other event".into(),
                        },
                        Envelope::Ok {
                            event_id: event.id,
                            ok: true,
                            reason: String::new(),
                        },
                    ],
                    OkPolicy::Reject(reason) => vec![Envelope::Ok {
                        event_id: event.id,
                        ok: false,
                        reason,
                    }],
                    OkPolicy::Silent => continue,
                }
            }
            _ => continue,
        };

        for reply in replies {
            if ws
                .send(Message::text(reply.to_json().unwrap()))
                .await
                .is_err()
            {
                break;
            }
        }
    }

    state.closed.fetch_add(1, Ordering::SeqCst);
}
