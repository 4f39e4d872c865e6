//! Groups: live instances of an organization
//!
//! A [`KernelScopeGroup`] arbitrates who plays which role and routes
//! messages between its roles. All membership state sits behind one lock
//! per group; listeners, peers, the player and the distant handler are
//! notified after it is released, in that order: player, peers, listeners,
//! remote.
//!
//! Conditions and the membership service are user code and may query the
//! group, so they run on a snapshot taken outside the lock. A change is
//! committed only if the membership revision is still the one they saw;
//! otherwise the checks run again on a fresh snapshot.

mod listener;
mod repository;
mod routing;
mod selector;

pub use listener::*;
pub use repository::*;
pub use selector::*;

use crate::config::GroupSettings;
use crate::error::{KernelError, KernelResult};
use crate::organization::{Organization, RoleFactory};
use crate::player::RolePlayer;
use crate::role::RoleInstance;
use crate::services::{DistantContextHandler, FifoMailbox, Mailbox, MembershipService};
use crate::telemetry::KernelTelemetry;
use agora_types::{
    Condition, ConditionContext, ConditionFailure, ConditionPhase, ConditionSet, GroupAddress,
    PlayerAddress, RoleAddress, RoleTypeId,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a role request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleGrant {
    Granted(RoleAddress),
    Refused(ConditionFailure),
}

impl RoleGrant {
    pub fn is_granted(&self) -> bool {
        matches!(self, RoleGrant::Granted(_))
    }

    pub fn address(&self) -> Option<&RoleAddress> {
        match self {
            RoleGrant::Granted(address) => Some(address),
            RoleGrant::Refused(_) => None,
        }
    }

    pub fn refusal(&self) -> Option<&ConditionFailure> {
        match self {
            RoleGrant::Granted(_) => None,
            RoleGrant::Refused(failure) => Some(failure),
        }
    }
}

/// How a group is created
#[derive(Clone, Default)]
pub struct GroupOptions {
    pub name: Option<String>,
    pub distributed: bool,
    /// Persistent groups survive being emptied until idle eviction
    pub persistent: bool,
    pub buffered_mailboxes: bool,
    pub membership: Option<Arc<dyn MembershipService>>,
}

impl GroupOptions {
    pub fn from_settings(settings: &GroupSettings) -> Self {
        Self {
            name: None,
            distributed: settings.distributed,
            persistent: settings.persistent,
            buffered_mailboxes: settings.buffered_mailboxes,
            membership: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn distributed(mut self, distributed: bool) -> Self {
        self.distributed = distributed;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_membership(mut self, membership: Arc<dyn MembershipService>) -> Self {
        self.membership = Some(membership);
        self
    }
}

impl fmt::Debug for GroupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupOptions")
            .field("name", &self.name)
            .field("distributed", &self.distributed)
            .field("persistent", &self.persistent)
            .field("buffered_mailboxes", &self.buffered_mailboxes)
            .field("membership", &self.membership.is_some())
            .finish()
    }
}

/// Players of one role type
#[derive(Default)]
struct RoleSlot {
    local: BTreeMap<PlayerAddress, Arc<RoleInstance>>,
    remote: BTreeSet<PlayerAddress>,
}

impl RoleSlot {
    fn holders(&self) -> usize {
        self.local.len() + self.remote.len()
    }

    fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }

    fn contains(&self, player: &PlayerAddress) -> bool {
        self.local.contains_key(player) || self.remote.contains(player)
    }
}

struct GroupState {
    /// role type -> players. Mirrors `players`.
    roles: BTreeMap<RoleTypeId, RoleSlot>,
    /// player -> role types. Mirrors `roles`.
    players: HashMap<PlayerAddress, BTreeSet<RoleTypeId>>,
    obtain_conditions: ConditionSet,
    leave_conditions: ConditionSet,
    listeners: Vec<Arc<dyn GroupListener>>,
    public_data: BTreeMap<String, Value>,
    private_data: BTreeMap<String, Value>,
    last_used: DateTime<Utc>,
    empty_since: Option<DateTime<Utc>>,
    removed: bool,
    /// Bumped on every membership or condition change
    revision: u64,
}

impl GroupState {
    fn holders(&self, role: &RoleTypeId) -> usize {
        self.roles.get(role).map(RoleSlot::holders).unwrap_or(0)
    }

    fn local_role(&self, role: &RoleTypeId, player: &PlayerAddress) -> Option<Arc<RoleInstance>> {
        self.roles.get(role)?.local.get(player).cloned()
    }

    fn add_member(&mut self, role: &RoleTypeId, player: &PlayerAddress) {
        self.players
            .entry(player.clone())
            .or_default()
            .insert(role.clone());
        self.empty_since = None;
        self.last_used = Utc::now();
        self.revision += 1;
    }

    fn remove_member(&mut self, role: &RoleTypeId, player: &PlayerAddress) {
        if let Some(slot) = self.roles.get_mut(role) {
            slot.local.remove(player);
            slot.remote.remove(player);
            if slot.is_empty() {
                self.roles.remove(role);
            }
        }
        if let Some(roles) = self.players.get_mut(player) {
            roles.remove(role);
            if roles.is_empty() {
                self.players.remove(player);
            }
        }
        self.last_used = Utc::now();
        self.revision += 1;
    }

    fn roles_of(&self, player: &PlayerAddress) -> BTreeSet<RoleTypeId> {
        self.players.get(player).cloned().unwrap_or_default()
    }

    /// Roles of every player other than `player`
    fn peers_of(&self, player: &PlayerAddress) -> Vec<Arc<RoleInstance>> {
        self.roles
            .values()
            .flat_map(|slot| slot.local.iter())
            .filter(|(holder, _)| *holder != player)
            .map(|(_, role)| Arc::clone(role))
            .collect()
    }
}

/// Kernel-side group: membership, conditions and routing
pub struct KernelScopeGroup {
    address: GroupAddress,
    organization: Arc<Organization>,
    distributed: bool,
    persistent: bool,
    buffered_mailboxes: bool,
    membership: Option<Arc<dyn MembershipService>>,
    distant: Option<Arc<dyn DistantContextHandler>>,
    selector: Arc<dyn ReceiverSelector>,
    telemetry: Arc<KernelTelemetry>,
    repository: Weak<GroupRepository>,
    state: Mutex<GroupState>,
}

impl KernelScopeGroup {
    pub(crate) fn new(
        address: GroupAddress,
        organization: Arc<Organization>,
        options: GroupOptions,
        distant: Option<Arc<dyn DistantContextHandler>>,
        selector: Arc<dyn ReceiverSelector>,
        telemetry: Arc<KernelTelemetry>,
        repository: Weak<GroupRepository>,
    ) -> Arc<Self> {
        let state = GroupState {
            roles: BTreeMap::new(),
            players: HashMap::new(),
            obtain_conditions: organization.obtain_conditions().clone(),
            leave_conditions: organization.leave_conditions().clone(),
            listeners: Vec::new(),
            public_data: BTreeMap::new(),
            private_data: BTreeMap::new(),
            last_used: Utc::now(),
            empty_since: None,
            removed: false,
            revision: 0,
        };
        Arc::new(Self {
            address,
            organization,
            distributed: options.distributed,
            persistent: options.persistent,
            buffered_mailboxes: options.buffered_mailboxes,
            membership: options.membership,
            distant,
            selector,
            telemetry,
            repository,
            state: Mutex::new(state),
        })
    }

    pub fn address(&self) -> &GroupAddress {
        &self.address
    }

    pub fn organization(&self) -> &Arc<Organization> {
        &self.organization
    }

    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    /// The distant handler, if this group forwards remotely
    fn remote(&self) -> Option<&Arc<dyn DistantContextHandler>> {
        if self.distributed {
            self.distant.as_ref()
        } else {
            None
        }
    }

    /// Ask for `role_type` on behalf of `player`.
    ///
    /// The behaviour comes from `factory` if given, else from the
    /// organization's constructor. Checks run in order: already playing,
    /// membership service, group obtain conditions, role obtain conditions.
    pub fn request_role(
        self: &Arc<Self>,
        player: &Arc<RolePlayer>,
        role_type: &RoleTypeId,
        factory: Option<&dyn RoleFactory>,
        init_args: Vec<Value>,
    ) -> KernelResult<RoleGrant> {
        let definition = self
            .organization
            .definition(role_type)
            .ok_or_else(|| KernelError::UndefinedRole {
                role: role_type.clone(),
                organization: self.organization.type_id().clone(),
            })?;
        let player_address = player.address().clone();

        if self.plays(&player_address, role_type) {
            let failure = ConditionFailure::AlreadyPlaying {
                role: role_type.clone(),
            };
            return Ok(self.refuse(&player_address, failure));
        }

        let behavior = if let Some(factory) = factory {
            factory.new_instance(role_type, &init_args)?
        } else if let Some(constructor) = &definition.constructor {
            constructor.new_instance(role_type, &init_args)?
        } else {
            return Err(KernelError::Factory(format!(
                "no constructor for role {}",
                role_type
            )));
        };

        let capacities = player.capacities().capacities();
        let credentials = player.credentials();
        let mailbox: Arc<dyn Mailbox> = if self.buffered_mailboxes {
            Arc::new(FifoMailbox::buffered())
        } else {
            Arc::new(FifoMailbox::new())
        };
        let address = RoleAddress::new(
            self.address.clone(),
            role_type.clone(),
            player_address.clone(),
        );
        let role = RoleInstance::new(
            address.clone(),
            Arc::downgrade(self),
            player,
            mailbox,
            behavior,
            init_args,
        );

        let (listeners, peers) = loop {
            let (revision, player_roles, role_holders, conditions) = {
                let state = self.state.lock();
                if state.removed {
                    return Err(KernelError::GroupRemoved(self.address.clone()));
                }
                let player_roles = state.roles_of(&player_address);
                if player_roles.contains(role_type) {
                    drop(state);
                    let failure = ConditionFailure::AlreadyPlaying {
                        role: role_type.clone(),
                    };
                    return Ok(self.refuse(&player_address, failure));
                }
                (
                    state.revision,
                    player_roles,
                    state.holders(role_type),
                    state.obtain_conditions.clone(),
                )
            };

            let ctx = ConditionContext {
                phase: ConditionPhase::Obtain,
                group: &self.address,
                role_type,
                player: &player_address,
                player_roles: &player_roles,
                role_holders,
                capacities: &capacities,
                credentials: credentials.as_ref(),
            };
            let verdict = match &self.membership {
                Some(membership) => membership.validate_role_taker(
                    &player_address,
                    role_type,
                    credentials.as_ref(),
                ),
                None => Ok(()),
            }
            .and_then(|_| conditions.evaluate(&ctx))
            .and_then(|_| definition.obtain_conditions.evaluate(&ctx));
            if let Err(failure) = verdict {
                return Ok(self.refuse(&player_address, failure));
            }

            let mut state = self.state.lock();
            if state.removed {
                return Err(KernelError::GroupRemoved(self.address.clone()));
            }
            if state.revision != revision {
                debug!(
                    group = %self.address,
                    role = %role_type,
                    player = %player_address,
                    "Membership changed during role checks, retrying"
                );
                continue;
            }

            state
                .roles
                .entry(role_type.clone())
                .or_default()
                .local
                .insert(player_address.clone(), Arc::clone(&role));
            state.add_member(role_type, &player_address);
            address.bind(&role);
            break (state.listeners.clone(), state.peers_of(&player_address));
        };

        self.telemetry.role_obtained();
        info!(group = %self.address, role = %role_type, player = %player_address, "Role obtained");

        player.role_obtained(&role);
        let event = GroupEvent::RoleTaken(address.clone());
        for peer in &peers {
            peer.push_group_event(event.clone());
        }
        for listener in &listeners {
            listener.on_group_event(&event);
        }
        if let Some(remote) = self.remote() {
            remote.inform_local_role_taken(&self.address, role_type, &player_address);
        }
        Ok(RoleGrant::Granted(address))
    }

    fn refuse(&self, player: &PlayerAddress, failure: ConditionFailure) -> RoleGrant {
        warn!(
            group = %self.address,
            role = %failure.role(),
            player = %player,
            reason = %failure,
            "Role request refused"
        );
        self.telemetry.role_refused();
        RoleGrant::Refused(failure)
    }

    /// Release `role_type` played by `player`. Returns false if the player
    /// does not play it here or a leave condition refuses.
    pub fn leave_role(&self, player: &PlayerAddress, role_type: &RoleTypeId) -> bool {
        self.release_role(player, role_type, true)
    }

    /// Release a role without consulting leave conditions, for roles that
    /// can no longer run.
    pub(crate) fn evict_role(&self, player: &PlayerAddress, role_type: &RoleTypeId) -> bool {
        self.release_role(player, role_type, false)
    }

    fn release_role(&self, player: &PlayerAddress, role_type: &RoleTypeId, checked: bool) -> bool {
        let definition = self.organization.definition(role_type);

        let (role, listeners, peers, emptied) = loop {
            let (revision, role, player_roles, role_holders, conditions) = {
                let state = self.state.lock();
                let Some(role) = state.local_role(role_type, player) else {
                    return false;
                };
                (
                    state.revision,
                    role,
                    state.roles_of(player),
                    state.holders(role_type),
                    state.leave_conditions.clone(),
                )
            };

            if checked {
                let owner = role.player();
                let capacities = owner
                    .as_ref()
                    .map(|p| p.capacities().capacities())
                    .unwrap_or_default();
                let credentials = owner.as_ref().and_then(|p| p.credentials());
                let ctx = ConditionContext {
                    phase: ConditionPhase::Leave,
                    group: &self.address,
                    role_type,
                    player,
                    player_roles: &player_roles,
                    role_holders,
                    capacities: &capacities,
                    credentials: credentials.as_ref(),
                };
                let verdict = conditions.evaluate(&ctx).and_then(|_| match definition {
                    Some(definition) => definition.leave_conditions.evaluate(&ctx),
                    None => Ok(()),
                });
                if let Err(failure) = verdict {
                    warn!(
                        group = %self.address,
                        role = %role_type,
                        player = %player,
                        reason = %failure,
                        "Role release refused"
                    );
                    return false;
                }
            }

            let mut state = self.state.lock();
            if state.revision != revision {
                continue;
            }
            state.remove_member(role_type, player);
            let emptied = state.players.is_empty() && !self.persistent;
            if emptied {
                state.removed = true;
            }
            break (role, state.listeners.clone(), state.peers_of(player), emptied);
        };

        let address = role.address().clone();
        address.unbind();
        role.begin_release();
        self.telemetry.role_released();
        info!(group = %self.address, role = %role_type, player = %player, "Role released");

        if emptied {
            self.detach();
        }

        if let Some(owner) = role.player() {
            owner.role_released(&address);
        }
        let event = GroupEvent::RoleReleased(address);
        for peer in &peers {
            peer.push_group_event(event.clone());
        }
        for listener in &listeners {
            listener.on_group_event(&event);
            if emptied {
                listener.on_group_event(&GroupEvent::GroupRemoved(self.address.clone()));
            }
        }
        if let Some(remote) = self.remote() {
            remote.inform_local_role_released(&self.address, role_type, player);
        }
        true
    }

    /// Release every role `player` plays here. True if at least one was
    /// released.
    pub fn leave_all_roles(&self, player: &PlayerAddress) -> bool {
        let roles = self.roles_of(player);
        roles
            .iter()
            .fold(false, |left, role| self.leave_role(player, role) || left)
    }

    /// Record a role held by a player living in another kernel
    pub fn register_remote_role(
        &self,
        role_type: &RoleTypeId,
        player: PlayerAddress,
    ) -> KernelResult<bool> {
        if !self.organization.defines(role_type) {
            return Err(KernelError::UndefinedRole {
                role: role_type.clone(),
                organization: self.organization.type_id().clone(),
            });
        }
        let (listeners, peers) = {
            let mut state = self.state.lock();
            if state.removed {
                return Err(KernelError::GroupRemoved(self.address.clone()));
            }
            let taken = state
                .roles
                .get(role_type)
                .map(|slot| slot.contains(&player))
                .unwrap_or(false);
            if taken {
                return Ok(false);
            }
            state
                .roles
                .entry(role_type.clone())
                .or_default()
                .remote
                .insert(player.clone());
            state.add_member(role_type, &player);
            (state.listeners.clone(), state.peers_of(&player))
        };

        info!(
            group = %self.address,
            role = %role_type,
            player = %player,
            "Remote role registered"
        );
        let address = RoleAddress::new(self.address.clone(), role_type.clone(), player);
        let event = GroupEvent::RoleTaken(address);
        for peer in &peers {
            peer.push_group_event(event.clone());
        }
        for listener in &listeners {
            listener.on_group_event(&event);
        }
        Ok(true)
    }

    pub fn unregister_remote_role(&self, role_type: &RoleTypeId, player: &PlayerAddress) -> bool {
        let (listeners, peers, emptied) = {
            let mut state = self.state.lock();
            let is_remote = state
                .roles
                .get(role_type)
                .map(|slot| slot.remote.contains(player))
                .unwrap_or(false);
            if !is_remote {
                return false;
            }
            state.remove_member(role_type, player);
            let emptied = state.players.is_empty() && !self.persistent;
            if emptied {
                state.removed = true;
            }
            (state.listeners.clone(), state.peers_of(player), emptied)
        };

        info!(
            group = %self.address,
            role = %role_type,
            player = %player,
            "Remote role unregistered"
        );
        if emptied {
            self.detach();
        }
        let address = RoleAddress::new(self.address.clone(), role_type.clone(), player.clone());
        let event = GroupEvent::RoleReleased(address);
        for peer in &peers {
            peer.push_group_event(event.clone());
        }
        for listener in &listeners {
            listener.on_group_event(&event);
            if emptied {
                listener.on_group_event(&GroupEvent::GroupRemoved(self.address.clone()));
            }
        }
        true
    }

    /// Whether this persistent group has been empty for longer than `delay`.
    ///
    /// The first observation of emptiness starts the clock; any member
    /// resets it. Non-persistent groups are never too old.
    pub fn is_too_old_group(&self, now: DateTime<Utc>, delay: Duration) -> bool {
        if !self.persistent {
            return false;
        }
        let mut state = self.state.lock();
        if !state.players.is_empty() {
            state.empty_since = None;
            return false;
        }
        let since = *state.empty_since.get_or_insert(now);
        (now - since)
            .to_std()
            .map(|elapsed| elapsed > delay)
            .unwrap_or(false)
    }

    /// Mark an empty group removed so no role can be taken any more.
    /// Returns false if it has members or is already removed.
    pub(crate) fn retire_if_empty(&self) -> bool {
        let mut state = self.state.lock();
        if state.removed || !state.players.is_empty() {
            return false;
        }
        state.removed = true;
        true
    }

    pub(crate) fn mark_removed(&self) {
        self.state.lock().removed = true;
    }

    fn detach(&self) {
        match self.repository.upgrade() {
            Some(repository) => {
                repository.remove(&self.address);
            }
            None => self.address.unbind(),
        }
    }

    pub fn plays(&self, player: &PlayerAddress, role_type: &RoleTypeId) -> bool {
        self.state
            .lock()
            .roles
            .get(role_type)
            .map(|slot| slot.contains(player))
            .unwrap_or(false)
    }

    pub fn roles_of(&self, player: &PlayerAddress) -> BTreeSet<RoleTypeId> {
        self.state.lock().roles_of(player)
    }

    pub fn players(&self) -> Vec<PlayerAddress> {
        self.state.lock().players.keys().cloned().collect()
    }

    pub fn player_count(&self) -> usize {
        self.state.lock().players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().players.is_empty()
    }

    /// Local and remote players of `role_type`
    pub fn holders(&self, role_type: &RoleTypeId) -> usize {
        self.state.lock().holders(role_type)
    }

    /// Addresses of the local roles of `role_type`, in address order
    pub fn role_addresses(&self, role_type: &RoleTypeId) -> Vec<RoleAddress> {
        self.state
            .lock()
            .roles
            .get(role_type)
            .map(|slot| slot.local.values().map(|r| r.address().clone()).collect())
            .unwrap_or_default()
    }

    pub fn role(&self, address: &RoleAddress) -> Option<Arc<RoleInstance>> {
        if address.group() != &self.address {
            return None;
        }
        self.resolve_role(address)
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        self.state.lock().last_used
    }

    pub fn add_obtain_condition(&self, condition: Arc<dyn Condition>) {
        let mut state = self.state.lock();
        state.obtain_conditions.push(condition);
        state.revision += 1;
    }

    pub fn add_leave_condition(&self, condition: Arc<dyn Condition>) {
        let mut state = self.state.lock();
        state.leave_conditions.push(condition);
        state.revision += 1;
    }

    pub fn add_group_listener(&self, listener: Arc<dyn GroupListener>) {
        self.state.lock().listeners.push(listener);
    }

    pub fn public_data(&self, key: &str) -> Option<Value> {
        self.state.lock().public_data.get(key).cloned()
    }

    pub fn set_public_data(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state.lock().public_data.insert(key.into(), value)
    }

    /// Private data is visible to current members only
    pub fn private_data(&self, requester: &PlayerAddress, key: &str) -> Option<Value> {
        let state = self.state.lock();
        if !state.players.contains_key(requester) {
            return None;
        }
        state.private_data.get(key).cloned()
    }

    /// Returns false if `requester` is not a member
    pub fn set_private_data(
        &self,
        requester: &PlayerAddress,
        key: impl Into<String>,
        value: Value,
    ) -> bool {
        let mut state = self.state.lock();
        if !state.players.contains_key(requester) {
            return false;
        }
        state.private_data.insert(key.into(), value);
        true
    }
}

impl fmt::Debug for KernelScopeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelScopeGroup")
            .field("address", &self.address)
            .field("organization", self.organization.type_id())
            .field("distributed", &self.distributed)
            .field("persistent", &self.persistent)
            .finish()
    }
}
