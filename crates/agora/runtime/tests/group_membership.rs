//! Conditions, listeners, shared data and idle eviction

mod common;

use agora_runtime::player::PlayerListener;
use agora_runtime::prelude::*;
use agora_runtime::services::MembershipService;
use agora_types::{
    Condition, ConditionContext, Credentials, FnCondition, HasRole, MaxPlayers, MinPlayers,
};
use chrono::{Duration as ChronoDuration, Utc};
use common::{kernel, role, Journal, JournalGroupListener};
use serde_json::json;
use std::sync::{mpsc, Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

#[tokio::test]
async fn test_group_conditions_apply_to_every_role() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    group.add_obtain_condition(Arc::new(MaxPlayers::any(2)));

    let players: Vec<_> = (0..3).map(|i| kernel.spawn_player(Some(&format!("p{i}")))).collect();
    assert!(players[0].request_role(&group, &role("Attendee"), vec![]).unwrap().is_granted());
    assert!(players[1].request_role(&group, &role("Attendee"), vec![]).unwrap().is_granted());
    let refused = players[2].request_role(&group, &role("Attendee"), vec![]).unwrap();
    assert!(matches!(
        refused.refusal(),
        Some(ConditionFailure::CardinalityExceeded { max: 2, .. })
    ));
    // The bound is per role type
    assert!(players[2].request_role(&group, &role("Reviewer"), vec![]).unwrap().is_granted());
}

#[tokio::test]
async fn test_role_prerequisite() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let reviewers_attend = FnCondition::new("reviewers attend", |ctx: &ConditionContext<'_>| {
        if ctx.role_type.as_str() == "Reviewer" {
            HasRole(RoleTypeId::new("Attendee")).evaluate(ctx)
        } else {
            Ok(())
        }
    });
    group.add_obtain_condition(Arc::new(reviewers_attend));
    let erin = kernel.spawn_player(Some("erin"));

    let refused = erin.request_role(&group, &role("Reviewer"), vec![]).unwrap();
    assert_eq!(
        refused.refusal(),
        Some(&ConditionFailure::RoleMissing {
            role: role("Reviewer"),
            required: role("Attendee"),
        })
    );
    erin.request_role(&group, &role("Attendee"), vec![]).unwrap();
    assert!(erin.request_role(&group, &role("Reviewer"), vec![]).unwrap().is_granted());
}

#[tokio::test]
async fn test_leave_condition_keeps_quorum() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    group.add_leave_condition(Arc::new(MinPlayers::of("Attendee", 1)));
    let alice = kernel.spawn_player(Some("alice"));
    let bob = kernel.spawn_player(Some("bob"));
    alice.request_role(&group, &role("Attendee"), vec![]).unwrap();
    bob.request_role(&group, &role("Attendee"), vec![]).unwrap();

    assert!(group.leave_role(alice.address(), &role("Attendee")));
    assert!(!group.leave_role(bob.address(), &role("Attendee")));
    assert!(bob.plays(group.address(), &role("Attendee")));
}

struct BadgeOffice;

impl MembershipService for BadgeOffice {
    fn validate_role_taker(
        &self,
        _player: &PlayerAddress,
        role: &RoleTypeId,
        credentials: Option<&Credentials>,
    ) -> Result<(), ConditionFailure> {
        match credentials.and_then(|c| c.claim("badge")) {
            Some(_) => Ok(()),
            None => Err(ConditionFailure::MembershipRejected {
                role: role.clone(),
                reason: "no badge".into(),
            }),
        }
    }
}

#[tokio::test]
async fn test_membership_service_checks_credentials() {
    let kernel = kernel();
    let options = GroupOptions::default().with_membership(Arc::new(BadgeOffice));
    let group = kernel.create_group_with("Meeting", options).unwrap();
    let frank = kernel.spawn_player(Some("frank"));

    let refused = frank.request_role(&group, &role("Attendee"), vec![]).unwrap();
    assert!(matches!(
        refused.refusal(),
        Some(ConditionFailure::MembershipRejected { .. })
    ));

    frank.set_credentials(Some(Credentials::new("frank").with_claim("badge", "B-12")));
    assert!(frank.request_role(&group, &role("Attendee"), vec![]).unwrap().is_granted());
}

struct JournalPlayerListener(Journal);

impl PlayerListener for JournalPlayerListener {
    fn role_obtained(&self, _player: &PlayerAddress, role: &RoleAddress) {
        self.0.push(format!("player:obtained:{}", role.role_type()));
    }

    fn role_released(&self, _player: &PlayerAddress, role: &RoleAddress) {
        self.0.push(format!("player:released:{}", role.role_type()));
    }
}

#[tokio::test]
async fn test_player_hears_before_group_listeners() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let journal = Journal::default();
    group.add_group_listener(Arc::new(JournalGroupListener(journal.clone())));
    let alice = kernel.spawn_player(Some("alice"));
    alice.add_listener(Arc::new(JournalPlayerListener(journal.clone())));

    alice.request_role(&group, &role("Attendee"), vec![]).unwrap();
    alice.leave_role(group.address(), &role("Attendee"));

    assert_eq!(
        journal.entries(),
        vec![
            "player:obtained:Attendee",
            "listener:taken:Attendee",
            "player:released:Attendee",
            "listener:released:Attendee",
            "listener:removed",
        ]
    );
}

#[tokio::test]
async fn test_private_data_is_for_members() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let alice = kernel.spawn_player(Some("alice"));
    let mallory = kernel.spawn_player(Some("mallory"));
    alice.request_role(&group, &role("Initiator"), vec![]).unwrap();

    assert!(group.set_private_data(alice.address(), "room", json!("B-204")));
    assert!(!group.set_private_data(mallory.address(), "room", json!("lobby")));
    assert_eq!(group.private_data(alice.address(), "room"), Some(json!("B-204")));
    assert_eq!(group.private_data(mallory.address(), "room"), None);

    assert_eq!(group.set_public_data("topic", json!("budget")), None);
    assert_eq!(group.public_data("topic"), Some(json!("budget")));
}

#[tokio::test]
async fn test_idle_persistent_group_is_evicted() {
    let kernel = kernel();
    let delay = kernel.config().groups.idle_eviction_delay();
    let group = kernel
        .create_group_with("Meeting", GroupOptions::default().persistent(true))
        .unwrap();
    let address = group.address().clone();
    let alice = kernel.spawn_player(Some("alice"));

    let t0 = Utc::now();
    // The first look starts the clock
    assert!(!group.is_too_old_group(t0, delay));
    assert!(group.is_too_old_group(t0 + ChronoDuration::seconds(2), delay));

    // A member resets it
    alice.request_role(&group, &role("Attendee"), vec![]).unwrap();
    assert!(!group.is_too_old_group(t0 + ChronoDuration::seconds(3), delay));
    assert!(alice.leave_role(&address, &role("Attendee")));
    assert!(!group.is_removed());

    let t1 = t0 + ChronoDuration::seconds(10);
    assert!(kernel.evict_idle_groups(t1).is_empty());
    assert_eq!(kernel.evict_idle_groups(t1 + ChronoDuration::seconds(2)), vec![address.clone()]);

    assert!(group.is_removed());
    assert!(!kernel.groups().contains(&address));
    let err = alice.request_role(&group, &role("Attendee"), vec![]).unwrap_err();
    assert!(matches!(err, KernelError::GroupRemoved(_)));
}

#[tokio::test]
async fn test_non_persistent_groups_are_never_too_old() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    let later = Utc::now() + ChronoDuration::hours(1);
    assert!(!group.is_too_old_group(Utc::now(), Duration::ZERO));
    assert!(!group.is_too_old_group(later, Duration::ZERO));
    assert!(kernel.evict_idle_groups(later).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_respect_cardinality() {
    let kernel = Arc::new(kernel());
    let group = kernel.create_group("Meeting").unwrap();
    let players: Vec<_> = (0..16)
        .map(|i| kernel.spawn_player(Some(&format!("p{i}"))))
        .collect();

    let handles: Vec<_> = players
        .into_iter()
        .map(|player| {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                player
                    .request_role(&group, &RoleTypeId::new("Initiator"), vec![])
                    .map(|grant| grant.is_granted())
            })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(group.holders(&role("Initiator")), 1);
}

/// Run `work` on its own thread and fail if it does not return promptly
fn finishes<T: Send + 'static>(work: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(work());
    });
    rx.recv_timeout(Duration::from_secs(5))
        .expect("membership change did not complete")
}

#[tokio::test]
async fn test_conditions_may_query_their_group() {
    let kernel = kernel();
    let group = kernel.create_group("Meeting").unwrap();
    group.set_public_data("seats", json!(2));

    let seats = Arc::downgrade(&group);
    group.add_obtain_condition(Arc::new(FnCondition::new(
        "a seat is left",
        move |ctx: &ConditionContext<'_>| {
            let Some(group) = seats.upgrade() else {
                return Ok(());
            };
            let limit = group.public_data("seats").and_then(|v| v.as_u64()).unwrap_or(0);
            if group.player_count() as u64 >= limit {
                return Err(ConditionFailure::custom(ctx.role_type, "no seat left"));
            }
            Ok(())
        },
    )));
    let quorum = Arc::downgrade(&group);
    group.add_leave_condition(Arc::new(FnCondition::new(
        "someone stays",
        move |ctx: &ConditionContext<'_>| match quorum.upgrade() {
            Some(group) if group.holders(ctx.role_type) <= 1 => {
                Err(ConditionFailure::custom(ctx.role_type, "last one out"))
            }
            _ => Ok(()),
        },
    )));

    let alice = kernel.spawn_player(Some("alice"));
    let bob = kernel.spawn_player(Some("bob"));
    let carol = kernel.spawn_player(Some("carol"));
    let outcome = finishes({
        let group = Arc::clone(&group);
        move || {
            let granted: Vec<bool> = [&alice, &bob, &carol]
                .iter()
                .map(|p| {
                    p.request_role(&group, &role("Attendee"), vec![])
                        .unwrap()
                        .is_granted()
                })
                .collect();
            let alice_left = group.leave_role(alice.address(), &role("Attendee"));
            let bob_left = group.leave_role(bob.address(), &role("Attendee"));
            (granted, alice_left, bob_left)
        }
    });

    assert_eq!(outcome, (vec![true, true, false], true, false));
    assert_eq!(group.holders(&role("Attendee")), 1);
}

/// Admits players while the group has fewer than `limit` members
struct DoorKeeper {
    group: OnceLock<Weak<KernelScopeGroup>>,
    limit: usize,
}

impl MembershipService for DoorKeeper {
    fn validate_role_taker(
        &self,
        _player: &PlayerAddress,
        role: &RoleTypeId,
        _credentials: Option<&Credentials>,
    ) -> Result<(), ConditionFailure> {
        let full = self
            .group
            .get()
            .and_then(Weak::upgrade)
            .map(|group| group.player_count() >= self.limit)
            .unwrap_or(false);
        if full {
            return Err(ConditionFailure::MembershipRejected {
                role: role.clone(),
                reason: "group is full".into(),
            });
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_membership_service_may_query_the_group() {
    let kernel = kernel();
    let keeper = Arc::new(DoorKeeper {
        group: OnceLock::new(),
        limit: 1,
    });
    let options = GroupOptions::default().with_membership(keeper.clone());
    let group = kernel.create_group_with("Meeting", options).unwrap();
    let _ = keeper.group.set(Arc::downgrade(&group));

    let alice = kernel.spawn_player(Some("alice"));
    let bob = kernel.spawn_player(Some("bob"));
    let (first, second) = finishes({
        let group = Arc::clone(&group);
        move || {
            (
                alice.request_role(&group, &role("Attendee"), vec![]).unwrap(),
                bob.request_role(&group, &role("Attendee"), vec![]).unwrap(),
            )
        }
    });

    assert!(first.is_granted());
    assert!(matches!(
        second.refusal(),
        Some(ConditionFailure::MembershipRejected { .. })
    ));
    assert_eq!(group.player_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_see_a_consistent_group() {
    let kernel = Arc::new(kernel());
    let group = kernel.create_group("Meeting").unwrap();
    let seat = Arc::downgrade(&group);
    group.add_obtain_condition(Arc::new(FnCondition::new(
        "one attendee",
        move |ctx: &ConditionContext<'_>| match seat.upgrade() {
            Some(group) if group.holders(&RoleTypeId::new("Attendee")) > 0 => {
                Err(ConditionFailure::custom(ctx.role_type, "seat taken"))
            }
            _ => Ok(()),
        },
    )));
    let players: Vec<_> = (0..16)
        .map(|i| kernel.spawn_player(Some(&format!("p{i}"))))
        .collect();

    let handles: Vec<_> = players
        .into_iter()
        .map(|player| {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                player
                    .request_role(&group, &RoleTypeId::new("Attendee"), vec![])
                    .map(|grant| grant.is_granted())
            })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(group.holders(&role("Attendee")), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_short_lived_groups_share_one_organization() {
    let kernel = Arc::new(kernel());
    let meeting = OrganizationTypeId::new("Meeting");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let kernel = Arc::clone(&kernel);
            let meeting = meeting.clone();
            tokio::spawn(async move {
                let player = kernel.spawn_player(Some(&format!("p{i}")));
                for _ in 0..50 {
                    let group = kernel.create_group(meeting.clone()).unwrap();
                    player.request_role(&group, &role("Attendee"), vec![]).unwrap();
                    let live = kernel.organizations().get(&meeting).unwrap();
                    assert!(Arc::ptr_eq(group.organization(), &live));
                    assert!(group.leave_role(player.address(), &role("Attendee")));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(kernel.groups().is_empty());
    assert!(kernel.organizations().is_empty());
}
