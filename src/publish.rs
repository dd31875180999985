use crate::{
    envelopes::Envelope,
    normalize_url,
    relay::{ConnectError, Relay},
    Event,
};
use std::{fmt, time::Duration};
use tokio::time::Instant;

/// phrases relays use to refuse events from non-members of a group
const MEMBERSHIP_DENIALS: [&str; 3] = ["unknown member", "not a member", "not member"];

/// an `OK` with `false`, as sent by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// machine-readable prefix like `blocked` or `restricted`, when the relay gave one
    pub prefix: Option<String>,
    /// the message exactly as received
    pub message: String,
}

impl Rejection {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let prefix = match message.split_once(": ") {
            Some((prefix, _)) if !prefix.is_empty() && !prefix.contains(' ') => {
                Some(prefix.to_string())
            }
            _ => None,
        };
        Self { prefix, message }
    }

    /// the relay refused because we are not part of the group yet
    pub fn is_membership_denial(&self) -> bool {
        let message = self.message.to_lowercase();
        MEMBERSHIP_DENIALS.iter().any(|phrase| message.contains(phrase))
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    Rejected(Rejection),
    /// no OK arrived in time; the relay may or may not have stored the event
    TimedOut,
    /// the connection failed before an OK arrived
    Failed(String),
}

/// send one event to one relay and wait for its `OK`, at most once
pub async fn publish(url: &str, event: &Event, timeout: Duration) -> PublishOutcome {
    let deadline = Instant::now() + timeout;

    let url = match normalize_url(url) {
        Ok(url) => url,
        Err(err) => return PublishOutcome::Failed(err.to_string()),
    };

    let mut relay = match Relay::connect(&url, deadline).await {
        Ok(relay) => relay,
        Err(ConnectError::TimedOut) => {
            log::info!("[{}] timed out connecting to publish {}", url, event.id);
            return PublishOutcome::TimedOut;
        }
        Err(err) => {
            log::info!("[{}] failed to connect to publish {}: {}", url, event.id, err);
            return PublishOutcome::Failed(err.to_string());
        }
    };

    let outcome = await_ok(&mut relay, event, deadline).await;
    relay.close().await;

    match &outcome {
        PublishOutcome::Accepted => log::info!("[{}] accepted {}", url, event.id),
        PublishOutcome::Rejected(rejection) => {
            log::info!("[{}] rejected {}: {}", url, event.id, rejection)
        }
        PublishOutcome::TimedOut => log::info!("[{}] no OK for {} in time", url, event.id),
        PublishOutcome::Failed(reason) => {
            log::info!("[{}] publishing {} failed: {}", url, event.id, reason)
        }
    }
    outcome
}

async fn await_ok(relay: &mut Relay, event: &Event, deadline: Instant) -> PublishOutcome {
    if let Err(err) = relay.send(&Envelope::OutEvent(event.clone())).await {
        return PublishOutcome::Failed(err.to_string());
    }

    loop {
        match tokio::time::timeout_at(deadline, relay.next_message()).await {
            Err(_) => return PublishOutcome::TimedOut,
            Ok(Err(err)) => return PublishOutcome::Failed(err.to_string()),
            Ok(Ok(None)) => {
                return PublishOutcome::Failed("connection closed before OK".to_string())
            }
            Ok(Ok(Some(Envelope::Ok {
                event_id,
                ok,
                reason,
            }))) if event_id == event.id => {
                return match ok {
                    true => PublishOutcome::Accepted,
                    false => PublishOutcome::Rejected(Rejection::new(reason)),
                };
            }
            Ok(Ok(Some(Envelope::Notice(notice)))) => {
                log::info!("[{}] received notice: {}", relay.url, notice);
            }
            Ok(Ok(Some(other))) => {
                log::debug!("[{}] ignoring {} while waiting for OK", relay.url, other.label());
            }
        }
    }
}
