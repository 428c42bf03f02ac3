use std::{fmt, sync::Arc};

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    config::HubConfig,
    decision::{GuardianInfo, HubStatus},
    error::ConfigError,
    guardian::{Guardian, GuardianFactory, GuardianId, GuardianStyle},
    selector::StyleSelector,
    threat::ThreatLevel,
};

/// Lifecycle of the pool. `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    /// Accepting growth.
    Active,
    /// Frozen; every request is blocked without evaluation.
    Shutdown,
}

/// A guardian added to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRecord {
    /// New member.
    pub id: GuardianId,
    /// Its style.
    pub style: GuardianStyle,
}

/// What one growth/shutdown step did to the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// The aggregated level was a growth trigger observed while active.
    pub triggered: bool,
    /// Guardians added by this step, in insertion order.
    pub spawned: Vec<SpawnRecord>,
    /// This step moved the pool from `Active` to `Shutdown`.
    pub entered_shutdown: bool,
}

/// Active guardians plus the growth/shutdown state machine.
///
/// Membership only ever grows, is capped at `max_guardians`, and is frozen once the pool
/// shuts down. Mutation goes through [`GuardianPool::apply`], which the hub calls under
/// its write lock.
pub struct GuardianPool {
    members: IndexMap<GuardianId, Arc<dyn Guardian>>,
    state: PoolState,
    growth_events: u64,
    threat_triggers: u64,
    spawn_factor: usize,
    max_guardians: usize,
    auto_grow: bool,
    factory: Arc<dyn GuardianFactory>,
    selector: Box<dyn StyleSelector>,
}

impl fmt::Debug for GuardianPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardianPool")
            .field("members", &self.members.len())
            .field("state", &self.state)
            .field("growth_events", &self.growth_events)
            .field("max_guardians", &self.max_guardians)
            .finish_non_exhaustive()
    }
}

impl GuardianPool {
    /// Validates `config` and seeds one guardian of each style.
    pub fn new(
        config: &HubConfig,
        factory: Arc<dyn GuardianFactory>,
        selector: Box<dyn StyleSelector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut pool = Self {
            members: IndexMap::with_capacity(config.max_guardians),
            state: PoolState::Active,
            growth_events: 0,
            threat_triggers: 0,
            spawn_factor: config.spawn_factor,
            max_guardians: config.max_guardians,
            auto_grow: config.auto_grow,
            factory,
            selector,
        };
        for style in GuardianStyle::ALL {
            pool.insert(style);
        }
        Ok(pool)
    }

    /// Current member count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the pool has no members; a constructed pool always holds its seed set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PoolState {
        self.state
    }

    /// Whether the pool is frozen.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.state == PoolState::Shutdown
    }

    /// Number of spawn episodes so far.
    #[must_use]
    pub const fn growth_events(&self) -> u64 {
        self.growth_events
    }

    /// Consistent copy of the membership in iteration order, used for one fan-out.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn Guardian>> {
        self.members.values().cloned().collect()
    }

    /// Applies the growth/shutdown step for one aggregated level.
    pub fn apply(&mut self, highest_threat: ThreatLevel) -> Transition {
        let mut transition = Transition::default();
        if self.is_shutdown() || !highest_threat.is_growth_trigger() {
            return transition;
        }
        transition.triggered = true;
        self.threat_triggers += 1;
        if !self.auto_grow {
            return transition;
        }

        let room = self.max_guardians.saturating_sub(self.members.len());
        let to_add = self.spawn_factor.min(room);
        for _ in 0..to_add {
            let style = self.selector.select();
            transition.spawned.push(self.insert(style));
        }
        if to_add > 0 {
            self.growth_events += 1;
        }
        if self.members.len() >= self.max_guardians {
            self.state = PoolState::Shutdown;
            transition.entered_shutdown = true;
        }
        transition
    }

    /// Point-in-time status.
    #[must_use]
    pub fn status(&self) -> HubStatus {
        HubStatus {
            pool_size: self.members.len(),
            is_shutdown: self.is_shutdown(),
            growth_events: self.growth_events,
            threat_triggers: self.threat_triggers,
            max_guardians: self.max_guardians,
            spawn_factor: self.spawn_factor,
            guardians: self
                .members
                .values()
                .map(|guardian| GuardianInfo::describe(guardian.as_ref()))
                .collect(),
            observed_at: Utc::now(),
        }
    }

    fn insert(&mut self, style: GuardianStyle) -> SpawnRecord {
        let mut id = GuardianId::generate();
        while self.members.contains_key(&id) {
            id = GuardianId::generate();
        }
        let guardian = self.factory.build(style, id.clone());
        self.members.insert(id.clone(), guardian);
        SpawnRecord { id, style }
    }
}
