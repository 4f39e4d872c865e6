//! Kernel context
//!
//! [`AgoraKernel`] ties one context together: organization and group
//! registries, the capacity executor, telemetry and the live players.

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::group::{
    FirstAvailable, GroupOptions, GroupRepository, KernelScopeGroup, ReceiverSelector,
};
use crate::organization::{OrganizationFactory, OrganizationRepository};
use crate::player::{ActivationReport, RolePlayer};
use crate::services::DistantContextHandler;
use crate::telemetry::{KernelTelemetry, TelemetrySnapshot};
use agora_capacity::CapacityExecutor;
use agora_types::{GroupAddress, OrganizationTypeId, PlayerAddress};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Builder for [`AgoraKernel`]
pub struct AgoraKernelBuilder {
    config: KernelConfig,
    distant: Option<Arc<dyn DistantContextHandler>>,
    selector: Arc<dyn ReceiverSelector>,
}

impl AgoraKernelBuilder {
    /// Install a distant context handler; distributed groups forward to it
    pub fn with_distant_handler(mut self, handler: Arc<dyn DistantContextHandler>) -> Self {
        self.distant = Some(handler);
        self
    }

    pub fn with_receiver_selector(mut self, selector: Arc<dyn ReceiverSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn build(self) -> KernelResult<AgoraKernel> {
        let telemetry = Arc::new(KernelTelemetry::new());
        let organizations = Arc::new(OrganizationRepository::new());
        let groups = GroupRepository::new(
            Arc::clone(&organizations),
            Arc::clone(&telemetry),
            self.distant,
            self.selector,
        );
        let executor = Arc::new(CapacityExecutor::new(self.config.executor.to_executor_config())?);

        info!(
            max_workers = self.config.executor.max_workers,
            persistent_groups = self.config.groups.persistent,
            "Agora kernel started"
        );

        Ok(AgoraKernel {
            config: self.config,
            telemetry,
            organizations,
            groups,
            executor,
            players: DashMap::new(),
        })
    }
}

/// One kernel context
pub struct AgoraKernel {
    config: KernelConfig,
    telemetry: Arc<KernelTelemetry>,
    organizations: Arc<OrganizationRepository>,
    groups: Arc<GroupRepository>,
    executor: Arc<CapacityExecutor>,
    players: DashMap<PlayerAddress, Arc<RolePlayer>>,
}

impl AgoraKernel {
    pub fn builder(config: KernelConfig) -> AgoraKernelBuilder {
        AgoraKernelBuilder {
            config,
            distant: None,
            selector: Arc::new(FirstAvailable),
        }
    }

    pub fn new(config: KernelConfig) -> KernelResult<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn organizations(&self) -> &Arc<OrganizationRepository> {
        &self.organizations
    }

    pub fn groups(&self) -> &Arc<GroupRepository> {
        &self.groups
    }

    pub fn executor(&self) -> &Arc<CapacityExecutor> {
        &self.executor
    }

    pub fn register_organization(
        &self,
        type_id: impl Into<OrganizationTypeId>,
        factory: impl OrganizationFactory + 'static,
    ) {
        self.organizations.register(type_id, factory);
    }

    /// Create a group with the configured defaults
    pub fn create_group(
        &self,
        organization: impl Into<OrganizationTypeId>,
    ) -> KernelResult<Arc<KernelScopeGroup>> {
        let options = GroupOptions::from_settings(&self.config.groups);
        self.create_group_with(organization, options)
    }

    pub fn create_group_with(
        &self,
        organization: impl Into<OrganizationTypeId>,
        options: GroupOptions,
    ) -> KernelResult<Arc<KernelScopeGroup>> {
        self.groups.create_group(&organization.into(), options)
    }

    pub fn group(&self, address: &GroupAddress) -> KernelResult<Arc<KernelScopeGroup>> {
        self.groups
            .resolve(address)
            .ok_or_else(|| KernelError::GroupNotFound(address.clone()))
    }

    pub fn spawn_player(&self, name: Option<&str>) -> Arc<RolePlayer> {
        let address = match name {
            Some(name) => PlayerAddress::named(name),
            None => PlayerAddress::generate(),
        };
        let player = RolePlayer::new(
            address.clone(),
            Arc::clone(&self.executor),
            Arc::clone(&self.groups),
            self.config.signals.policy,
        );
        self.players.insert(address.clone(), Arc::clone(&player));
        info!(player = %address, "Player spawned");
        player
    }

    pub fn player(&self, address: &PlayerAddress) -> KernelResult<Arc<RolePlayer>> {
        self.players
            .get(address)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| KernelError::PlayerNotFound(address.clone()))
    }

    pub fn players(&self) -> Vec<Arc<RolePlayer>> {
        self.players.iter().map(|p| Arc::clone(p.value())).collect()
    }

    /// Remove a player: leave all its roles, let their `end` hooks run and
    /// drop its pending capacity results.
    pub async fn kill_player(&self, address: &PlayerAddress) -> bool {
        let Some((_, player)) = self.players.remove(address) else {
            return false;
        };
        player.leave_all_roles();
        player.run_once().await;
        let cleared = player.clear_capacity_results();
        info!(player = %address, cleared_tasks = cleared, "Player killed");
        true
    }

    /// One scheduling pass over every player
    pub async fn run_once(&self) -> ActivationReport {
        let mut report = ActivationReport::default();
        for player in self.players() {
            report += player.run_once().await;
        }
        report
    }

    /// Remove persistent groups that stayed empty past the configured delay
    pub fn evict_idle_groups(&self, now: DateTime<Utc>) -> Vec<GroupAddress> {
        let delay = self.config.groups.idle_eviction_delay();
        let mut evicted = Vec::new();
        for group in self.groups.groups() {
            if group.is_too_old_group(now, delay) && group.retire_if_empty() {
                let address = group.address().clone();
                self.groups.remove(&address);
                info!(group = %address, "Idle group evicted");
                evicted.push(address);
            }
        }
        evicted
    }

    /// Release every role, run the `end` hooks and stop the executor
    pub async fn shutdown(&self) {
        info!(players = self.players.len(), "Shutting down Agora kernel");
        let players = self.players();
        for player in &players {
            player.leave_all_roles();
        }
        for player in &players {
            player.run_once().await;
        }
        self.executor.shutdown();
        info!("Agora kernel stopped");
    }
}
