//! builds group snapshots by fetching metadata, admins, messages and profiles in turn

use crate::{
    config::{Config, ProfilePolicy},
    group::{self, GroupMetadataResolver, GroupSnapshot, MetadataSource},
    pool::RelayFailure,
    Event, Metadata, Pool, PubKey, Timestamp,
};
use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::sync::{watch, RwLock};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no group id configured")]
    MissingGroupId,

    #[error("none of the group relays could be reached")]
    RelaysUnreachable,
}

/// where the current refresh cycle is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    FetchingMetadata,
    FetchingAdmins,
    FetchingMessages,
    FetchingProfiles,
    Ready,
    Errored(AggregateError),
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Applied(Arc<GroupSnapshot>),
    /// a newer refresh started before this one finished; its results were dropped
    Superseded,
}

/// latest kind 0 seen per author
type ProfileMap = HashMap<PubKey, (Timestamp, Metadata)>;

pub struct GroupAggregator {
    config: Arc<Config>,
    pool: Pool,
    generation: AtomicU64,
    state: watch::Sender<FetchState>,
    snapshot: RwLock<Option<Arc<GroupSnapshot>>>,
}

impl GroupAggregator {
    pub fn new(config: Arc<Config>, pool: Pool) -> Self {
        let (state, _) = watch::channel(FetchState::Idle);
        Self {
            config,
            pool,
            generation: AtomicU64::new(0),
            state,
            snapshot: RwLock::new(None),
        }
    }

    pub fn state(&self) -> FetchState {
        self.state.borrow().clone()
    }

    /// follow state changes, e.g. to show a spinner per step
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.subscribe()
    }

    /// the last snapshot a refresh applied
    pub async fn snapshot(&self) -> Option<Arc<GroupSnapshot>> {
        self.snapshot.read().await.clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// state changes from a superseded cycle are dropped
    fn set_state(&self, generation: u64, state: FetchState) {
        if self.is_current(generation) {
            log::debug!("refresh #{}: {:?}", generation, state);
            self.state.send_replace(state);
        }
    }

    fn fail(&self, generation: u64, err: AggregateError) -> Result<RefreshOutcome, AggregateError> {
        if !self.is_current(generation) {
            return Ok(RefreshOutcome::Superseded);
        }
        log::warn!("refresh #{} failed: {}", generation, err);
        self.set_state(generation, FetchState::Errored(err.clone()));
        Err(err)
    }

    /// run one full fetch cycle; starting another refresh makes this one `Superseded`
    pub async fn refresh(&self) -> Result<RefreshOutcome, AggregateError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(group_id) = self.config.group_id.clone() else {
            return self.fail(generation, AggregateError::MissingGroupId);
        };
        let scope = self.config.group_scope();
        let timeout = self.config.query_timeout;
        let mut failures: Vec<RelayFailure> = Vec::new();

        self.set_state(generation, FetchState::FetchingMetadata);
        let metadata = self
            .pool
            .query_filters(&scope, group::metadata_filters(&group_id), timeout)
            .await;
        failures.extend(metadata.failures);

        self.set_state(generation, FetchState::FetchingAdmins);
        let admins = self
            .pool
            .query_filters(&scope, group::admin_filters(&group_id), timeout)
            .await;
        failures.extend(admins.failures);
        let admins = group::select_latest(&admins.events)
            .map(group::admins_from_event)
            .unwrap_or_default();

        self.set_state(generation, FetchState::FetchingMessages);
        let messages = self
            .pool
            .query(
                &scope,
                group::messages_filter(&group_id, self.config.message_limit),
                timeout,
            )
            .await;
        if messages.all_failed() {
            return self.fail(generation, AggregateError::RelaysUnreachable);
        }
        failures.extend(messages.failures);
        let mut messages = messages.events;
        glidesort::sort_by_key(&mut messages, |event| Reverse(event.created_at));
        messages.truncate(self.config.message_limit);

        self.set_state(generation, FetchState::FetchingProfiles);
        let mut authors: Vec<PubKey> = Vec::new();
        let mut known = HashSet::new();
        for pk in messages
            .iter()
            .map(|m| m.pubkey)
            .chain(admins.iter().map(|a| a.pubkey))
        {
            if known.insert(pk) {
                authors.push(pk);
            }
        }
        let profiles = self.fetch_profiles(&scope, &authors, &mut failures).await;

        let metadata = GroupMetadataResolver::new(group_id.as_str()).resolve(&metadata.events, &messages);
        let snapshot = Arc::new(GroupSnapshot {
            managed: metadata.source == MetadataSource::Relay,
            group_id,
            metadata,
            admins,
            messages,
            profiles,
            relay_failures: failures,
            generation,
            fetched_at: Timestamp::now(),
        });

        {
            let mut current = self.snapshot.write().await;
            if !self.is_current(generation) {
                log::debug!("refresh #{} superseded, dropping its results", generation);
                return Ok(RefreshOutcome::Superseded);
            }
            *current = Some(snapshot.clone());
        }
        self.set_state(generation, FetchState::Ready);
        log::info!(
            "refresh #{}: {} messages, {} admins, {} profiles",
            generation,
            snapshot.messages.len(),
            snapshot.admins.len(),
            snapshot.profiles.len()
        );

        Ok(RefreshOutcome::Applied(snapshot))
    }

    /// profiles from the group scope first, then the fallback relays as the policy says
    async fn fetch_profiles(
        &self,
        scope: &[String],
        authors: &[PubKey],
        failures: &mut Vec<RelayFailure>,
    ) -> HashMap<PubKey, Metadata> {
        let mut profiles = ProfileMap::new();
        if authors.is_empty() {
            return HashMap::new();
        }

        let timeout = self.config.query_timeout;
        let outcome = self
            .pool
            .query(scope, group::profiles_filter(authors.iter().copied()), timeout)
            .await;
        failures.extend(outcome.failures);
        let group_scope_empty = outcome.events.is_empty();
        collect_profiles(&mut profiles, &outcome.events);

        let wanted: Vec<PubKey> = match self.config.profile_policy {
            ProfilePolicy::FallbackWhenEmpty if group_scope_empty => authors.to_vec(),
            ProfilePolicy::FallbackWhenEmpty => Vec::new(),
            ProfilePolicy::FillMissing => authors
                .iter()
                .filter(|pk| !profiles.contains_key(*pk))
                .copied()
                .collect(),
        };

        if !wanted.is_empty() && !self.config.fallback_relays.is_empty() {
            log::debug!("asking fallback relays for {} profiles", wanted.len());
            let outcome = self
                .pool
                .query(
                    &self.config.fallback_relays,
                    group::profiles_filter(wanted),
                    timeout,
                )
                .await;
            failures.extend(outcome.failures);
            collect_profiles(&mut profiles, &outcome.events);
        }

        profiles
            .into_iter()
            .map(|(pk, (_, metadata))| (pk, metadata))
            .collect()
    }
}

/// keep the newest parseable kind 0 per author; unparseable ones are skipped
fn collect_profiles(profiles: &mut ProfileMap, events: &[Event]) {
    for event in events {
        let metadata = match Metadata::from_event(event) {
            Ok(metadata) => metadata,
            Err(err) => {
                log::info!("skipping unparseable profile {} of {}: {}", event.id, event.pubkey.short(), err);
                continue;
            }
        };

        match profiles.get(&event.pubkey) {
            Some((created_at, _)) if *created_at >= event.created_at => {}
            _ => {
                profiles.insert(event.pubkey, (event.created_at, metadata));
            }
        }
    }
}
