use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use seatlock::engine::{Engine, EngineError};
use seatlock::model::*;

const TTL: Ms = 300_000;

// ── Test infrastructure ──────────────────────────────────────

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("seatlock_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

async fn new_engine(name: &str) -> Arc<Engine> {
    Arc::new(Engine::new(test_wal_path(name), TTL).unwrap())
}

async fn usage(engine: &Engine, rid: Ulid, now: Ms) -> u64 {
    let info = engine.resource_info(rid, now).await.unwrap();
    info.hold_count + info.confirmed_count
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_callers_never_oversell() {
    let engine = new_engine("oversell.wal").await;
    let rid = Ulid::new();
    assert_ok!(
        engine
            .create_resource(rid, ResourceSpec::with_capacity(37), 0)
            .await
    );

    let attempts = (0..100).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.create_hold(rid, Ulid::new(), 1 + i % 3, 0).await })
    });
    let results = join_all(attempts).await;

    let mut granted = 0u64;
    for r in results {
        match r.unwrap() {
            Ok(hold) => granted += u64::from(hold.quantity),
            Err(EngineError::InsufficientCapacity { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(granted <= 37);
    assert_eq!(usage(&engine, rid, 0).await, granted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_holds_of_five_on_capacity_ten() {
    let engine = new_engine("three_by_five.wal").await;
    let rid = Ulid::new();
    assert_ok!(
        engine
            .create_resource(rid, ResourceSpec::with_capacity(10), 0)
            .await
    );

    let results = join_all((0..3).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.create_hold(rid, Ulid::new(), 5, 0).await })
    }))
    .await;

    let failures = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| matches!(r, Err(EngineError::InsufficientCapacity { .. })))
        .count();
    assert!(failures >= 1);
    assert!(usage(&engine, rid, 0).await <= 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_operations_keep_capacity_invariant() {
    let engine = new_engine("mixed.wal").await;
    let rid = Ulid::new();
    let capacity = 12;
    assert_ok!(
        engine
            .create_resource(rid, ResourceSpec::with_capacity(capacity), 0)
            .await
    );

    // Every hold is placed at t=0 and the sweeper runs past their deadline,
    // so sweeps race confirms and cancels on the same rows.
    let sweeper = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut expired = 0;
            for _ in 0..50 {
                expired += engine.sweep_expired_holds(TTL + 1).await.unwrap();
                tokio::task::yield_now().await;
            }
            expired
        })
    };

    let workers = (0..16u64).map(|w| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let principal = Ulid::new();
            for round in 0..25u64 {
                let quantity = 1 + (w % 2) as u32;
                let Ok(hold) = engine.create_hold(rid, principal, quantity, 0).await else {
                    continue;
                };
                match (w + round) % 3 {
                    0 => {
                        let _ = engine.confirm(hold.id, principal, 1).await;
                    }
                    1 => {
                        let _ = engine.cancel(hold.id, principal).await;
                    }
                    _ => {}
                }

                let used = usage(&engine, rid, 0).await;
                assert!(used <= u64::from(capacity), "usage {used} over capacity");
            }
        })
    });
    for r in join_all(workers).await {
        r.unwrap();
    }
    sweeper.await.unwrap();
    assert!(usage(&engine, rid, 0).await <= u64::from(capacity));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirm_and_cancel_race_settles_once() {
    let engine = new_engine("confirm_cancel.wal").await;
    let rid = Ulid::new();
    assert_ok!(
        engine
            .create_resource(rid, ResourceSpec::with_capacity(100), 0)
            .await
    );
    let principal = Ulid::new();

    for _ in 0..20 {
        let hold = engine.create_hold(rid, principal, 1, 0).await.unwrap();
        let (confirm, cancel) = tokio::join!(
            {
                let engine = engine.clone();
                tokio::spawn(async move { engine.confirm(hold.id, principal, 1).await })
            },
            {
                let engine = engine.clone();
                tokio::spawn(async move { engine.cancel(hold.id, principal).await })
            }
        );
        let confirm = confirm.unwrap();
        assert_ok!(cancel.unwrap());

        // Cancel always wins eventually: either it ran first and confirm saw
        // CANCELLED, or it cancelled the confirmation.
        let row = engine.get_reservation(hold.id).unwrap();
        assert_eq!(row.status, ReservationStatus::Cancelled);
        if confirm.is_err() {
            assert!(matches!(confirm, Err(EngineError::InvalidState { .. })));
        }
    }
    assert_eq!(usage(&engine, rid, 1).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resources_do_not_contend() {
    let engine = new_engine("independent.wal").await;
    let rids: Vec<Ulid> = (0..8).map(|_| Ulid::new()).collect();
    for &rid in &rids {
        assert_ok!(
            engine
                .create_resource(rid, ResourceSpec::with_capacity(5), 0)
                .await
        );
    }

    let results = join_all(rids.iter().map(|&rid| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.create_hold(rid, Ulid::new(), 5, 0).await })
    }))
    .await;
    for r in results {
        assert_ok!(r.unwrap());
    }
    for &rid in &rids {
        assert_err!(engine.create_hold(rid, Ulid::new(), 1, 0).await);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn compaction_under_load_loses_nothing() {
    let path = test_wal_path("compact_load.wal");
    let rid = Ulid::new();
    let principal = Ulid::new();
    let expected = {
        let engine = Arc::new(Engine::new(path.clone(), TTL).unwrap());
        assert_ok!(
            engine
                .create_resource(rid, ResourceSpec::with_capacity(1_000), 0)
                .await
        );

        let writers = (0..4).map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let hold = engine.create_hold(rid, principal, 1, 0).await.unwrap();
                    engine.confirm(hold.id, principal, 1).await.unwrap();
                }
            })
        });
        let compactor = {
            let engine = engine.clone();
            tokio::spawn(async move {
                for _ in 0..5 {
                    engine.compact_wal().await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        for w in join_all(writers).await {
            w.unwrap();
        }
        compactor.await.unwrap();

        engine.reservations_for_resource(rid).await.unwrap()
    };

    let engine = Engine::new(path, TTL).unwrap();
    let replayed = engine.reservations_for_resource(rid).await.unwrap();
    assert_eq!(replayed.len(), 200);
    assert_eq!(replayed, expected);
    assert_eq!(engine.confirmed_count(rid, 1).await.unwrap(), 200);
}
