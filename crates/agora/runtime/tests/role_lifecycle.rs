//! Activation, live ticks, sleep, leave and end of roles

mod common;

use agora_runtime::organization::DefaultRoleFactory;
use agora_runtime::prelude::*;
use agora_runtime::role::RoleLifecycle;
use agora_runtime::services::Memory;
use agora_types::MinPlayers;
use async_trait::async_trait;
use common::{kernel, role, Journal};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Logs every callback and leaves after `lives` ticks
struct Recorder {
    journal: Journal,
    lives: usize,
    ticks: usize,
}

#[async_trait]
impl RoleBehavior for Recorder {
    async fn activate(&mut self, _ctx: &RoleContext, args: &[Value]) -> KernelResult<()> {
        self.journal.push(format!("activate:{}", Value::Array(args.to_vec())));
        Ok(())
    }

    async fn live(&mut self, ctx: &RoleContext) -> KernelResult<()> {
        self.ticks += 1;
        self.journal.push("live");
        if self.ticks == self.lives {
            ctx.leave_me();
            self.journal.push("leave_me");
        }
        Ok(())
    }

    async fn end(&mut self, _ctx: &RoleContext) {
        self.journal.push("end");
    }
}

fn recorder(journal: &Journal, lives: usize) -> impl RoleFactory {
    let journal = journal.clone();
    move |_: &RoleTypeId, _: &[Value]| -> KernelResult<Box<dyn RoleBehavior>> {
        Ok(Box::new(Recorder {
            journal: journal.clone(),
            lives,
            ticks: 0,
        }))
    }
}

#[tokio::test]
async fn test_lifecycle_order() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    // Keeps the group alive once alice is gone
    let bob = kernel.spawn_player(Some("bob"));
    bob.request_role(&group, &role("Attendee"), vec![]).unwrap();

    let journal = Journal::default();
    let grant = alice
        .request_role_with(&group, &role("Initiator"), &recorder(&journal, 2), vec![json!(3)])
        .unwrap();
    let address = grant.address().cloned().unwrap();
    let instance = group.role(&address).unwrap();
    assert_eq!(instance.lifecycle(), RoleLifecycle::Created);
    assert_eq!(instance.init_args(), &[json!(3)]);

    // Activation and the first live pass share a tick
    let report = alice.run_once().await;
    assert_eq!(report.ran, 1);
    assert_eq!(instance.lifecycle(), RoleLifecycle::Live);
    assert_eq!(journal.entries(), vec!["activate:[3]", "live"]);

    // The leave happens once live returns
    alice.run_once().await;
    assert_eq!(journal.entries(), vec!["activate:[3]", "live", "live", "leave_me"]);
    assert_eq!(instance.lifecycle(), RoleLifecycle::Releasing);
    assert!(!group.plays(alice.address(), &role("Initiator")));
    assert!(alice.roles().is_empty());

    // end runs on the following tick
    let report = alice.run_once().await;
    assert_eq!(report.ended, 1);
    assert_eq!(instance.lifecycle(), RoleLifecycle::Destroyed);
    assert_eq!(journal.entries().last().map(String::as_str), Some("end"));
    assert!(alice.activator().is_empty());
    assert!(!address.is_bound());
}

#[tokio::test]
async fn test_released_before_activation_skips_end() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    let journal = Journal::default();

    alice
        .request_role_with(&group, &role("Attendee"), &recorder(&journal, 10), vec![])
        .unwrap();
    assert!(alice.leave_role(group.address(), &role("Attendee")));

    let report = alice.run_once().await;
    assert_eq!(report.ended, 1);
    assert!(journal.entries().is_empty());
}

/// Echoes every message back to its sender, sleeping until the next one
#[derive(Default)]
struct Echo;

#[async_trait]
impl RoleBehavior for Echo {
    async fn live(&mut self, ctx: &RoleContext) -> KernelResult<()> {
        for message in ctx.take_messages() {
            ctx.reply(&message, "echo", message.content().clone())?;
        }
        ctx.sleep_until(WakeCondition::MessageArrival);
        Ok(())
    }
}

/// Sends one ping at activation and remembers the answer
#[derive(Default)]
struct Pinger;

#[async_trait]
impl RoleBehavior for Pinger {
    async fn activate(&mut self, ctx: &RoleContext, _args: &[Value]) -> KernelResult<()> {
        ctx.send_to("Attendee", "ping", json!("hello"))?;
        Ok(())
    }

    async fn live(&mut self, ctx: &RoleContext) -> KernelResult<()> {
        if let Some(answer) = ctx.take_messages_of("echo").pop() {
            ctx.memory().put("answer", answer.content().clone());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_sleep_until_message_and_ping_pong() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    let bob = kernel.spawn_player(Some("bob"));

    let echo = bob
        .request_role_with(&group, &role("Attendee"), &DefaultRoleFactory::<Echo>::new(), vec![])
        .unwrap()
        .address()
        .cloned()
        .unwrap();
    let echo_role = group.role(&echo).unwrap();

    // Nothing to echo yet; the role falls asleep
    assert_eq!(bob.run_once().await.ran, 1);
    assert_eq!(echo_role.lifecycle(), RoleLifecycle::Sleeping);
    assert_eq!(bob.run_once().await.sleeping, 1);

    alice
        .request_role_with(&group, &role("Initiator"), &DefaultRoleFactory::<Pinger>::new(), vec![])
        .unwrap();
    alice.run_once().await;

    // The ping wakes the echo
    assert_eq!(bob.run_once().await.ran, 1);
    alice.run_once().await;
    assert_eq!(alice.memory().get_memorized_data("answer"), Some(json!("hello")));
}

/// Sleeps for a fixed delay on every tick
#[derive(Default)]
struct Napper;

#[async_trait]
impl RoleBehavior for Napper {
    async fn live(&mut self, ctx: &RoleContext) -> KernelResult<()> {
        ctx.sleep(Duration::from_secs(10));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_timed_sleep_wakes_after_delay() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    alice
        .request_role_with(&group, &role("Attendee"), &DefaultRoleFactory::<Napper>::new(), vec![])
        .unwrap();

    assert_eq!(alice.run_once().await.ran, 1);
    assert_eq!(alice.run_once().await.sleeping, 1);

    tokio::time::advance(Duration::from_secs(11)).await;
    assert_eq!(alice.run_once().await.ran, 1);
}

#[tokio::test]
async fn test_migrated_player_is_not_scheduled() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    let journal = Journal::default();
    alice
        .request_role_with(&group, &role("Attendee"), &recorder(&journal, 10), vec![])
        .unwrap();

    alice.set_migrated(true);
    let report = alice.run_once().await;
    assert_eq!(report.cancelled, 1);
    assert!(journal.entries().is_empty());

    alice.set_migrated(false);
    assert_eq!(alice.run_once().await.ran, 1);
}

/// Refuses to start
#[derive(Default)]
struct Stillborn;

#[async_trait]
impl RoleBehavior for Stillborn {
    async fn activate(&mut self, _ctx: &RoleContext, _args: &[Value]) -> KernelResult<()> {
        Err(KernelError::Behavior("no quorum".into()))
    }

    async fn live(&mut self, _ctx: &RoleContext) -> KernelResult<()> {
        unreachable!("live must not run after a failed activation")
    }
}

#[tokio::test]
async fn test_failed_activation_leaves_the_group() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    let bob = kernel.spawn_player(Some("bob"));
    bob.request_role(&group, &role("Attendee"), vec![]).unwrap();

    let stillborn = DefaultRoleFactory::<Stillborn>::new();
    alice
        .request_role_with(&group, &role("Initiator"), &stillborn, vec![])
        .unwrap();
    assert_eq!(alice.run_once().await.cancelled, 1);
    assert!(!group.plays(alice.address(), &role("Initiator")));
}

#[tokio::test]
async fn test_failed_activation_ignores_leave_conditions() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    let bob = kernel.spawn_player(Some("bob"));
    bob.request_role(&group, &role("Attendee"), vec![]).unwrap();
    group.add_leave_condition(Arc::new(MinPlayers::of("Initiator", 1)));

    let stillborn = DefaultRoleFactory::<Stillborn>::new();
    let grant = alice
        .request_role_with(&group, &role("Initiator"), &stillborn, vec![])
        .unwrap();
    let instance = group.role(grant.address().unwrap()).unwrap();

    // The lone Initiator could not leave on its own
    assert!(!group.leave_role(alice.address(), &role("Initiator")));

    assert_eq!(alice.run_once().await.cancelled, 1);
    assert_eq!(instance.lifecycle(), RoleLifecycle::Releasing);
    assert!(!group.plays(alice.address(), &role("Initiator")));
    assert!(group.plays(bob.address(), &role("Attendee")));

    let report = alice.run_once().await;
    assert_eq!(report.ended, 1);
    assert_eq!(instance.lifecycle(), RoleLifecycle::Destroyed);
    assert!(alice.activator().is_empty());
}

/// Records membership events of its group
#[derive(Default)]
struct Watcher;

#[async_trait]
impl RoleBehavior for Watcher {
    async fn activate(&mut self, ctx: &RoleContext, _args: &[Value]) -> KernelResult<()> {
        ctx.subscribe_group_events();
        Ok(())
    }

    async fn live(&mut self, ctx: &RoleContext) -> KernelResult<()> {
        let mut seen = Vec::new();
        while let Some(event) = ctx.next_group_event() {
            seen.push(match event {
                GroupEvent::RoleTaken(role) => json!(["taken", role.role_type().as_str()]),
                GroupEvent::RoleReleased(role) => json!(["released", role.role_type().as_str()]),
                GroupEvent::GroupRemoved(_) => json!(["removed"]),
            });
        }
        if !seen.is_empty() {
            ctx.memory().put("events", Value::Array(seen));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_peers_observe_membership_changes() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    let bob = kernel.spawn_player(Some("bob"));

    let watcher = DefaultRoleFactory::<Watcher>::new();
    alice
        .request_role_with(&group, &role("Initiator"), &watcher, vec![])
        .unwrap();
    alice.run_once().await;

    bob.request_role(&group, &role("Attendee"), vec![]).unwrap();
    assert!(bob.leave_role(group.address(), &role("Attendee")));
    alice.run_once().await;

    assert_eq!(
        alice.memory().get_memorized_data("events"),
        Some(json!([["taken", "Attendee"], ["released", "Attendee"]]))
    );
}

#[tokio::test]
async fn test_kill_player_runs_end_hooks() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    let bob = kernel.spawn_player(Some("bob"));
    bob.request_role(&group, &role("Attendee"), vec![]).unwrap();

    let journal = Journal::default();
    alice
        .request_role_with(&group, &role("Initiator"), &recorder(&journal, 10), vec![])
        .unwrap();
    kernel.run_once().await;

    assert!(kernel.kill_player(alice.address()).await);
    assert!(!kernel.kill_player(alice.address()).await);
    assert_eq!(journal.entries().last().map(String::as_str), Some("end"));
    assert!(matches!(
        kernel.player(alice.address()),
        Err(KernelError::PlayerNotFound(_))
    ));
    assert_eq!(group.players(), vec![bob.address().clone()]);
}
