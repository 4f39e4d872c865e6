//! End-to-end capacity scenarios on the worker pool

use agora_capacity::{
    CapacityContainer, CapacityExecutor, CapacityImplementation, CapacityPrototype, ExecutorConfig,
    FnCapacity, ImplementationKind, Invocation, ParamKind, ParamSpec,
};
use agora_types::{CapacityId, PlayerAddress};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn sum_capacity() -> Arc<dyn CapacityImplementation> {
    let prototype = CapacityPrototype::new("Sum")
        .with_description("Adds two integers")
        .with_input(ParamSpec::required("a", ParamKind::Integer))
        .with_input(ParamSpec::required("b", ParamKind::Integer))
        .with_output(ParamSpec::required("total", ParamKind::Integer));
    Arc::new(FnCapacity::new(prototype, |ctx| {
        let total = ctx.input_i64(0)? + ctx.input_i64(1)?;
        ctx.push_output(json!(total));
        Ok(())
    }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sum_is_waited_once() {
    let executor = CapacityExecutor::new(ExecutorConfig::default()).unwrap();
    let container = CapacityContainer::new();
    container.add(sum_capacity());

    let alice = PlayerAddress::named("alice");
    let sum = CapacityId::new("Sum");
    let implementation = container.implementation(&sum).unwrap();
    let task = executor
        .submit(&sum, implementation, Invocation::new(alice.clone(), vec![json!(2), json!(3)]))
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !executor.has_result(&alice, task) {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let ctx = executor
        .wait_result(&alice, task, Some(Duration::from_secs(1)))
        .await
        .expect("Sum result");
    assert!(ctx.is_success());
    assert_eq!(ctx.outputs(), &[json!(5)]);
    assert_eq!(ctx.kind(), ImplementationKind::Standard);

    assert!(executor
        .wait_result(&alice, task, Some(Duration::from_secs(1)))
        .await
        .is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_many_players_get_their_own_results() {
    let executor = Arc::new(CapacityExecutor::new(ExecutorConfig::default()).unwrap());
    let sum = CapacityId::new("Sum");
    let implementation = sum_capacity();

    let mut submitted = Vec::new();
    for i in 0..20i64 {
        let player = PlayerAddress::named(format!("p{}", i));
        let task = executor
            .submit(
                &sum,
                Arc::clone(&implementation),
                Invocation::new(player.clone(), vec![json!(i), json!(i)]),
            )
            .await
            .unwrap();
        submitted.push((player, task, i * 2));
    }

    let handles: Vec<_> = submitted
        .into_iter()
        .map(|(player, task, expected)| {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                let ctx = executor
                    .wait_result(&player, task, Some(Duration::from_secs(5)))
                    .await
                    .expect("result");
                assert_eq!(ctx.caller(), &player);
                assert_eq!(ctx.output(0), Some(&json!(expected)));
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(executor.pending_count(), 0);
}
