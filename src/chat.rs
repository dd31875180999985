//! sending to a group as the logged-in identity

use crate::{
    config::Config,
    event_template::SignError,
    group,
    publish::{publish, PublishOutcome, Rejection},
    session::Session,
    Event, EventTemplate,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("no group id configured")]
    MissingGroupId,

    #[error("no relay to publish to")]
    NoRelay,

    #[error("signing failed: {0}")]
    Sign(#[from] SignError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Accepted(Event),
    /// the relay does not know us as a member, a join request is the way in
    JoinRequired(Rejection),
    Rejected(Rejection),
    /// no answer in time; the event may still show up on the relay
    TimedOut(Event),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct GroupChat {
    config: Arc<Config>,
    session: Session,
}

impl GroupChat {
    pub fn new(config: Arc<Config>, session: Session) -> Self {
        Self { config, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// publish a kind 9 message to the group relay; surrounding whitespace is dropped
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let group_id = self.group_id()?;

        let template = group::chat_message(group_id, text, self.session.pubkey());
        self.send(template, self.config.publish_timeout, true).await
    }

    /// ask the group relay to add us as a member
    pub async fn request_join(&self, reason: &str) -> Result<SendOutcome, ChatError> {
        let group_id = self.group_id()?;

        let template = group::join_request(group_id, reason.trim(), self.session.pubkey());
        self.send(template, self.config.join_timeout, false).await
    }

    fn group_id(&self) -> Result<&str, ChatError> {
        self.config
            .group_id
            .as_deref()
            .ok_or(ChatError::MissingGroupId)
    }

    async fn send(
        &self,
        template: EventTemplate,
        timeout: Duration,
        detect_membership: bool,
    ) -> Result<SendOutcome, ChatError> {
        let relay = self.config.publish_relay().ok_or(ChatError::NoRelay)?;
        let event = template.sign(self.session.secret())?;

        Ok(match publish(relay, &event, timeout).await {
            PublishOutcome::Accepted => SendOutcome::Accepted(event),
            PublishOutcome::Rejected(rejection)
                if detect_membership && rejection.is_membership_denial() =>
            {
                log::info!("not a member of the group yet: {}", rejection);
                SendOutcome::JoinRequired(rejection)
            }
            PublishOutcome::Rejected(rejection) => SendOutcome::Rejected(rejection),
            PublishOutcome::TimedOut => SendOutcome::TimedOut(event),
            PublishOutcome::Failed(reason) => SendOutcome::Failed(reason),
        })
    }
}
