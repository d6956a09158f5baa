//! End-to-end tests driving a whole kitchen through the public API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pizzeria::config::{Command, Config, StationConfig, TimingConfig};
use pizzeria::kitchen::Kitchen;
use pizzeria::report::Report;
use pizzeria::substrate::{MemorySubstrate, QueueSide, Substrate, SubstrateRef, keys};

/// Timing model where every action is instantaneous and always succeeds.
fn instant_timing() -> TimingConfig {
    let ops = [
        "take", "sauce", "cheese", "to_oven", "bake", "from_oven", "slice", "pack", "put",
    ];
    TimingConfig {
        reliability: HashMap::new(),
        seconds_per_action: ops.iter().map(|op| (op.to_string(), 0.0)).collect(),
        variation: (1.0, 1.0),
    }
}

fn supplier_station(count: usize) -> StationConfig {
    StationConfig::Robot {
        count,
        operations: ["take", "sauce", "cheese", "sync1", "to_oven", "sync2"]
            .map(String::from)
            .to_vec(),
        border_state: "freezer".to_string(),
        reset_state: "freezer".to_string(),
        after_oven: false,
    }
}

fn consumer_station(count: usize) -> StationConfig {
    StationConfig::Robot {
        count,
        operations: ["bake", "free", "from_oven", "slice", "pack", "put"]
            .map(String::from)
            .to_vec(),
        border_state: "shelf".to_string(),
        reset_state: "freezer".to_string(),
        after_oven: true,
    }
}

fn line_config(suppliers: usize, consumers: usize, ovens: usize, commands: Vec<Command>) -> Config {
    Config {
        kitchen: vec![
            supplier_station(suppliers),
            consumer_station(consumers),
            StationConfig::Oven { count: ovens },
            StationConfig::CameraSystem {
                operations: vec!["cheese".to_string(), "slice".to_string()],
            },
        ],
        timing: instant_timing(),
        commands,
        // Staggered startup guarantees cameras subscribe before any robot
        // completes a step.
        launch_delay_ms: 10,
        metrics: Default::default(),
    }
}

/// Poll the substrate until `expected` orders sit on the shelf, or panic
/// after `deadline`.
async fn wait_for_shelf(substrate: &dyn Substrate, expected: usize, deadline: Duration) -> Report {
    let end = tokio::time::Instant::now() + deadline;
    loop {
        let report = Report::build(substrate).await.unwrap();
        if report.orders_in("shelf").len() >= expected {
            return report;
        }
        assert!(
            tokio::time::Instant::now() < end,
            "timed out waiting for {expected} orders on the shelf; report:\n{report}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_single_order_travels_the_whole_line() {
    let substrate: SubstrateRef = Arc::new(MemorySubstrate::new());
    let config = line_config(1, 1, 1, vec![Command::Order(1)]);

    let mut kitchen = Kitchen::new(config, Arc::clone(&substrate))
        .unwrap()
        .with_seed(1);
    kitchen.start().await.unwrap();

    let report = wait_for_shelf(substrate.as_ref(), 1, Duration::from_secs(20)).await;
    kitchen.shutdown();

    assert_eq!(report.orders_in("shelf"), &[0]);
    assert_eq!(report.state_by_order[&0], "shelf");
    // Both camera operations scored the order.
    let scores = &report.quality_by_order[&0];
    assert!(scores.contains_key("cheese"), "missing cheese score: {scores:?}");
    assert!(scores.contains_key("slice"), "missing slice score: {scores:?}");
    for quality in scores.values() {
        assert!((0.0..=1.0).contains(quality));
    }
}

#[tokio::test]
async fn test_burst_of_orders_all_reach_the_shelf() {
    let substrate: SubstrateRef = Arc::new(MemorySubstrate::new());
    let config = line_config(2, 2, 2, vec![Command::Order(5)]);

    let mut kitchen = Kitchen::new(config, Arc::clone(&substrate))
        .unwrap()
        .with_seed(2);
    kitchen.start().await.unwrap();

    let report = wait_for_shelf(substrate.as_ref(), 5, Duration::from_secs(30)).await;
    kitchen.shutdown();

    assert_eq!(report.orders_in("shelf"), &[0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_surviving_robot_rescues_reset_orders() {
    let substrate: SubstrateRef = Arc::new(MemorySubstrate::new());
    // Robot 0 and 1 are the suppliers; break one of them up front. Whatever
    // it picks up gets reset to the freezer and the other supplier must
    // finish every order anyway.
    let config = line_config(
        2,
        1,
        1,
        vec![Command::Break(0), Command::Order(3)],
    );

    let mut kitchen = Kitchen::new(config, Arc::clone(&substrate))
        .unwrap()
        .with_seed(3);
    kitchen.start().await.unwrap();

    let report = wait_for_shelf(substrate.as_ref(), 3, Duration::from_secs(30)).await;
    kitchen.shutdown();

    assert_eq!(report.orders_in("shelf"), &[0, 1, 2]);
}

#[tokio::test]
async fn test_breaking_every_supplier_strands_orders_in_freezer() {
    let substrate: SubstrateRef = Arc::new(MemorySubstrate::new());
    let config = line_config(
        2,
        1,
        1,
        vec![
            Command::Break(0),
            Command::Break(1),
            Command::Order(2),
            // Give the suppliers time to pick up, fail, and reset.
            Command::Sleep(2.0),
        ],
    );

    let mut kitchen = Kitchen::new(config, Arc::clone(&substrate))
        .unwrap()
        .with_seed(4);
    kitchen.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;

    let report = Report::build(substrate.as_ref()).await.unwrap();
    kitchen.shutdown();

    // No supplier survived, so nothing can leave the freezer.
    assert!(report.orders_in("shelf").is_empty(), "report:\n{report}");
    assert_eq!(report.orders_in("freezer").len(), 2);
    for scores in report.quality_by_order.values() {
        assert!(scores.is_empty(), "reset orders must have no quality data");
    }
}

#[tokio::test]
async fn test_ovens_return_to_the_free_pool() {
    let substrate: SubstrateRef = Arc::new(MemorySubstrate::new());
    let config = line_config(1, 1, 2, vec![Command::Order(2)]);

    let mut kitchen = Kitchen::new(config, Arc::clone(&substrate))
        .unwrap()
        .with_seed(5);
    kitchen.start().await.unwrap();

    wait_for_shelf(substrate.as_ref(), 2, Duration::from_secs(30)).await;
    // Let the consumer settle back into waiting for its next oven.
    tokio::time::sleep(Duration::from_millis(500)).await;
    kitchen.shutdown();

    // The single consumer holds one oven while waiting for more work; the
    // other must be back in (or never have left) the free pool.
    let mut free = 0;
    while substrate
        .queue_pop(
            keys::OVEN_FREE_QUEUE,
            QueueSide::Left,
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap()
        .is_some()
    {
        free += 1;
    }
    assert_eq!(free, 1);
}
