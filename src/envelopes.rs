use crate::{Event, Filter, ID};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("empty message")]
    EmptyMessage,
    #[error("invalid label")]
    InvalidLabel,
    #[error("invalid {0} envelope")]
    InvalidEnvelope(&'static str),
    #[error("unknown envelope label: {0}")]
    UnknownLabel(String),
    #[error("JSON parsing error")]
    Json(#[from] serde_json::Error),
    #[error("ID parsing error")]
    IdParsing(#[from] crate::types::IDError),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// nostr message envelopes, both directions
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// `["EVENT", subscription_id, event]` from a relay
    InEvent {
        subscription_id: String,
        event: Event,
    },
    /// `["EVENT", event]` to a relay
    OutEvent(Event),
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    Close(String),
    Eose(String),
    Ok {
        event_id: ID,
        ok: bool,
        reason: String,
    },
    Notice(String),
    Closed {
        subscription_id: String,
        reason: String,
    },
    AuthChallenge(String),
}

impl Envelope {
    /// get the label for this envelope type
    pub fn label(&self) -> &'static str {
        match self {
            Envelope::InEvent { .. } => "EVENT",
            Envelope::OutEvent(_) => "EVENT",
            Envelope::Req { .. } => "REQ",
            Envelope::Close(_) => "CLOSE",
            Envelope::Eose(_) => "EOSE",
            Envelope::Ok { .. } => "OK",
            Envelope::Notice(_) => "NOTICE",
            Envelope::Closed { .. } => "CLOSED",
            Envelope::AuthChallenge(_) => "AUTH",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = match self {
            Envelope::Req { filters, .. } => 2 + filters.len(),
            Envelope::InEvent { .. } | Envelope::Closed { .. } => 3,
            Envelope::Ok { .. } => 4,
            _ => 2,
        };

        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(self.label())?;
        match self {
            Envelope::InEvent {
                subscription_id,
                event,
            } => {
                seq.serialize_element(subscription_id)?;
                seq.serialize_element(event)?;
            }
            Envelope::OutEvent(event) => seq.serialize_element(event)?,
            Envelope::Req {
                subscription_id,
                filters,
            } => {
                seq.serialize_element(subscription_id)?;
                for filter in filters {
                    seq.serialize_element(filter)?;
                }
            }
            Envelope::Close(id) | Envelope::Eose(id) => seq.serialize_element(id)?,
            Envelope::Ok {
                event_id,
                ok,
                reason,
            } => {
                seq.serialize_element(event_id)?;
                seq.serialize_element(ok)?;
                seq.serialize_element(reason)?;
            }
            Envelope::Notice(message) | Envelope::AuthChallenge(message) => {
                seq.serialize_element(message)?
            }
            Envelope::Closed {
                subscription_id,
                reason,
            } => {
                seq.serialize_element(subscription_id)?;
                seq.serialize_element(reason)?;
            }
        }
        seq.end()
    }
}

fn string_at(arr: &[Value], idx: usize, label: &'static str) -> Result<String> {
    arr.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(EnvelopeError::InvalidEnvelope(label))
}

/// parse a message into an envelope
pub fn parse_message(message: &str) -> Result<Envelope> {
    let mut arr: Vec<Value> = serde_json::from_str(message)?;
    if arr.is_empty() {
        return Err(EnvelopeError::EmptyMessage);
    }

    let label = arr[0].as_str().ok_or(EnvelopeError::InvalidLabel)?;

    match label {
        "EVENT" => match arr.len() {
            2 => Ok(Envelope::OutEvent(serde_json::from_value(arr[1].take())?)),
            3 => Ok(Envelope::InEvent {
                subscription_id: string_at(&arr, 1, "EVENT")?,
                event: serde_json::from_value(arr[2].take())?,
            }),
            _ => Err(EnvelopeError::InvalidEnvelope("EVENT")),
        },
        "REQ" => {
            if arr.len() < 3 {
                return Err(EnvelopeError::InvalidEnvelope("REQ"));
            }

            let subscription_id = string_at(&arr, 1, "REQ")?;
            let filters = arr
                .drain(2..)
                .map(serde_json::from_value)
                .collect::<std::result::Result<Vec<Filter>, _>>()?;
            Ok(Envelope::Req {
                subscription_id,
                filters,
            })
        }
        "CLOSE" => Ok(Envelope::Close(string_at(&arr, 1, "CLOSE")?)),
        "EOSE" => Ok(Envelope::Eose(string_at(&arr, 1, "EOSE")?)),
        "NOTICE" => Ok(Envelope::Notice(string_at(&arr, 1, "NOTICE")?)),
        "CLOSED" => Ok(Envelope::Closed {
            subscription_id: string_at(&arr, 1, "CLOSED")?,
            // some relays omit the reason
            reason: arr
                .get(2)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        "OK" => {
            if arr.len() < 3 {
                return Err(EnvelopeError::InvalidEnvelope("OK"));
            }
            Ok(Envelope::Ok {
                event_id: ID::from_hex(&string_at(&arr, 1, "OK")?)?,
                ok: arr[2].as_bool().ok_or(EnvelopeError::InvalidEnvelope("OK"))?,
                reason: arr
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        }
        "AUTH" => Ok(Envelope::AuthChallenge(string_at(&arr, 1, "AUTH")?)),
        _ => Err(EnvelopeError::UnknownLabel(label.to_string())),
    }
}
