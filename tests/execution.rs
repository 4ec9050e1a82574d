use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tick_scheduler::prelude::*;
use tick_scheduler::{ExecutionMode, MissingAccessPolicy, SchedulerError};

struct Position;
struct Velocity;
struct Score;

fn m(priority: i32) -> SystemMetadata {
    SystemMetadata::new(priority)
}

fn parallel_config() -> SchedulerConfig {
    SchedulerConfig::default().with_worker_threads(4)
}

/// Registers three systems where the middle one fails or panics.
fn three_with_broken_middle(scheduler: &mut Scheduler, panics: bool, side_effect: Arc<AtomicUsize>) {
    scheduler.add_fn_infallible("first", m(0).writes::<Position>(), |_| {}).unwrap();
    if panics {
        scheduler
            .add_fn_infallible("second", m(1).writes::<Position>(), |_| panic!("broken invariant"))
            .unwrap();
    } else {
        scheduler
            .add_fn("second", m(1).writes::<Position>(), |_| Err("out of range".into()))
            .unwrap();
    }
    scheduler
        .add_fn_infallible("third", m(2).writes::<Position>(), move |_| {
            side_effect.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
}

fn assert_isolated(scheduler: &Scheduler, side_effect: &AtomicUsize, expected_error: &str) {
    assert_eq!(side_effect.load(Ordering::SeqCst), 1);
    let stats = scheduler.stats_snapshot();
    for name in ["first", "second", "third"] {
        assert_eq!(stats.get(name).unwrap().runs, 1, "{name} should have run once");
    }
    let second = stats.get("second").unwrap();
    assert_eq!(second.failures, 1);
    assert_eq!(second.last_error.as_deref(), Some(expected_error));
    assert_eq!(stats.get("third").unwrap().failures, 0);
}

#[test]
fn failing_system_does_not_stop_the_tick() {
    let side_effect = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::with_config(parallel_config());
    three_with_broken_middle(&mut scheduler, false, Arc::clone(&side_effect));

    let report = scheduler.execute(0.016);
    assert_eq!(report.mode, ExecutionMode::Staged);
    assert_eq!(report.failed, vec!["second".to_string()]);
    assert_isolated(&scheduler, &side_effect, "out of range");
}

#[test]
fn panicking_system_does_not_stop_the_tick() {
    let side_effect = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::with_config(parallel_config());
    three_with_broken_middle(&mut scheduler, true, Arc::clone(&side_effect));

    let report = scheduler.execute(0.016);
    assert_eq!(report.invoked.len(), 3);
    assert_isolated(&scheduler, &side_effect, "panicked: broken invariant");
}

#[test]
fn panic_inside_a_parallel_stage_is_isolated() {
    let survivors = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::with_config(parallel_config());
    scheduler.add_fn_infallible("boom", m(0), |_| panic!("boom")).unwrap();
    for name in ["a", "b", "c"] {
        let survivors = Arc::clone(&survivors);
        scheduler
            .add_fn_infallible(name, m(0).reads::<Position>(), move |_| {
                survivors.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let report = scheduler.execute(0.0);
    assert_eq!(report.stages_run, 1);
    assert_eq!(report.failed, vec!["boom".to_string()]);
    assert_eq!(survivors.load(Ordering::SeqCst), 3);
}

#[test]
fn sequential_fallback_matches_staged_result() {
    // Order-dependent arithmetic: any reordering of conflicting systems
    // changes the final value.
    fn build(parallel: bool, value: Arc<AtomicI64>, other: Arc<AtomicI64>) -> Scheduler {
        let mut scheduler = Scheduler::with_config(parallel_config().with_parallel(parallel));
        let v = Arc::clone(&value);
        scheduler
            .add_fn_infallible("double", m(0).writes::<Score>(), move |_| {
                v.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |x| Some(x * 2)).unwrap();
            })
            .unwrap();
        let v = Arc::clone(&value);
        scheduler
            .add_fn_infallible("increment", m(1).writes::<Score>(), move |_| {
                v.fetch_add(3, Ordering::SeqCst);
            })
            .unwrap();
        let v = Arc::clone(&value);
        scheduler
            .add_fn_infallible("square", m(2).writes::<Score>(), move |_| {
                v.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |x| Some(x * x)).unwrap();
            })
            .unwrap();
        scheduler
            .add_fn_infallible("unrelated", m(1).writes::<Velocity>(), move |_| {
                other.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        scheduler
    }

    let staged_value = Arc::new(AtomicI64::new(1));
    let staged_other = Arc::new(AtomicI64::new(0));
    let mut staged = build(true, Arc::clone(&staged_value), Arc::clone(&staged_other));

    let seq_value = Arc::new(AtomicI64::new(1));
    let seq_other = Arc::new(AtomicI64::new(0));
    let mut sequential = build(false, Arc::clone(&seq_value), Arc::clone(&seq_other));

    for _ in 0..3 {
        assert_eq!(staged.execute(0.0).mode, ExecutionMode::Staged);
        assert_eq!(sequential.execute(0.0).mode, ExecutionMode::Sequential);
    }

    assert_eq!(staged_value.load(Ordering::SeqCst), seq_value.load(Ordering::SeqCst));
    assert_eq!(staged_other.load(Ordering::SeqCst), 3);
    assert_eq!(seq_other.load(Ordering::SeqCst), 3);
}

#[test]
fn sequential_mode_runs_in_priority_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::with_config(SchedulerConfig::default().with_parallel(false));
    for (name, priority) in [("late", 9), ("b_mid", 5), ("a_mid", 5), ("early", -1)] {
        let order = Arc::clone(&order);
        scheduler
            .add_fn_infallible(name, m(priority), move |ctx| {
                assert!(ctx.stage.is_none());
                order.lock().unwrap().push(name);
            })
            .unwrap();
    }

    let report = scheduler.execute(0.0);
    assert_eq!(report.mode, ExecutionMode::Sequential);
    assert!(report.failed.is_empty());
    assert_eq!(*order.lock().unwrap(), vec!["early", "a_mid", "b_mid", "late"]);
    assert_eq!(report.invoked, vec!["early", "a_mid", "b_mid", "late"]);
}

#[test]
fn toggling_parallel_switches_modes() {
    let mut scheduler = Scheduler::with_config(parallel_config());
    scheduler.add_fn_infallible("a", m(0), |_| {}).unwrap();
    assert_eq!(scheduler.execute(0.0).mode, ExecutionMode::Staged);

    scheduler.set_parallel_enabled(false).unwrap();
    assert_eq!(scheduler.execute(0.0).mode, ExecutionMode::Sequential);

    scheduler.set_parallel_enabled(true).unwrap();
    assert_eq!(scheduler.execute(0.0).mode, ExecutionMode::Staged);
}

#[test]
fn conflicting_writers_never_overlap() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::with_config(parallel_config());

    for i in 0..6 {
        let in_flight = Arc::clone(&in_flight);
        let overlaps = Arc::clone(&overlaps);
        scheduler
            .add_fn_infallible(format!("writer_{i}"), m(0).writes::<Position>(), move |_| {
                if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(std::time::Duration::from_millis(2));
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    for _ in 0..5 {
        let report = scheduler.execute(0.0);
        assert_eq!(report.stages_run, 6);
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn stage_barrier_orders_writer_before_readers() {
    let value = Arc::new(AtomicI64::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::with_config(parallel_config());

    let v = Arc::clone(&value);
    scheduler
        .add_fn_infallible("movement", m(100).writes::<Position>(), move |ctx| {
            std::thread::sleep(std::time::Duration::from_millis(5));
            v.store(ctx.tick as i64, Ordering::SeqCst);
        })
        .unwrap();
    for name in ["logic", "render"] {
        let v = Arc::clone(&value);
        let seen = Arc::clone(&seen);
        scheduler
            .add_fn_infallible(name, m(200).reads::<Position>(), move |ctx| {
                assert_eq!(ctx.stage, Some(1));
                seen.lock().unwrap().push(v.load(Ordering::SeqCst));
            })
            .unwrap();
    }

    let report = scheduler.execute(0.0);
    assert_eq!(report.stages_run, 2);
    assert!(report.failed.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![1, 1]);
}

#[test]
fn late_registration_runs_on_next_tick() {
    let mut scheduler = Scheduler::with_config(parallel_config());
    scheduler.add_fn_infallible("movement", m(100).writes::<Position>(), |_| {}).unwrap();
    scheduler.execute(0.016);
    assert!(!scheduler.is_plan_stale());

    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    scheduler
        .add_fn_infallible("render", m(200).reads::<Position>(), move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(scheduler.is_plan_stale());

    let report = scheduler.execute(0.016);
    assert!(report.invoked.contains(&"render".to_string()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.stats_for("render").unwrap().runs, 1);
    assert_eq!(scheduler.plan().unwrap().stage_of("render"), Some(1));
}

#[test]
fn shutdown_request_stops_between_stages() {
    let mut scheduler = Scheduler::with_config(parallel_config());
    let handle = scheduler.shutdown_handle();

    let stopper = handle.clone();
    scheduler
        .add_fn_infallible("first", m(0).writes::<Position>(), move |_| stopper.request())
        .unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ran);
    scheduler
        .add_fn_infallible("second", m(1).writes::<Position>(), move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let report = scheduler.execute(0.0);
    assert!(report.aborted);
    assert_eq!(report.invoked, vec!["first".to_string()]);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(handle.is_requested());
}

#[test]
fn tick_context_carries_delta_and_tick() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let mut scheduler = Scheduler::new();
    scheduler
        .add_fn_infallible("observer", m(0), move |ctx| {
            s.lock().unwrap().push((ctx.tick, ctx.delta_time));
        })
        .unwrap();

    scheduler.execute(0.5);
    scheduler.execute(0.25);
    assert_eq!(*seen.lock().unwrap(), vec![(1, 0.5), (2, 0.25)]);
    assert_eq!(scheduler.tick(), 2);
    assert_eq!(scheduler.stats_snapshot().tick, 2);
}

#[test]
fn stats_accumulate_over_ticks() {
    let mut scheduler = Scheduler::new();
    scheduler
        .add_fn_infallible("sleepy", m(0), |_| {
            std::thread::sleep(std::time::Duration::from_millis(1));
        })
        .unwrap();
    scheduler.add_fn_infallible("idle", m(0), |_| {}).unwrap();

    for _ in 0..4 {
        scheduler.execute(0.0);
    }
    let stats = scheduler.stats_for("sleepy").unwrap();
    assert_eq!(stats.runs, 4);
    assert_eq!(stats.last_tick, 4);
    assert!(stats.mean_ms >= 1.0, "mean {}", stats.mean_ms);
    assert!(stats.max_ms >= stats.last_ms);

    let json = scheduler.stats_snapshot().to_json().unwrap();
    assert!(json.contains("\"sleepy\""));
}

#[test]
fn never_run_systems_report_zeroed_stats() {
    let mut scheduler = Scheduler::new();
    scheduler.add_fn_infallible("pending", m(0), |_| {}).unwrap();
    let stats = scheduler.stats_for("pending").unwrap();
    assert_eq!(stats.runs, 0);
    assert_eq!(stats.mean_ms, 0.0);
}

#[test]
fn registration_errors_leave_state_untouched() {
    let config = SchedulerConfig::default().with_missing_access(MissingAccessPolicy::Reject);
    let mut scheduler = Scheduler::with_config(config);
    scheduler.add_fn_infallible("a", m(0), |_| {}).unwrap();
    scheduler.rebuild();

    let dup = scheduler.add_fn_infallible("a", m(3), |_| {});
    assert_eq!(dup, Err(SchedulerError::DuplicateSystem { name: "a".into() }));

    let undeclared = FnSystem::undeclared("legacy", |_ctx: &TickContext| Ok(()));
    assert_eq!(
        scheduler.add_system(undeclared),
        Err(SchedulerError::MissingMetadata { name: "legacy".into() })
    );

    assert_eq!(scheduler.system_names(), vec!["a".to_string()]);
    assert!(!scheduler.is_plan_stale());
}

#[test]
fn shared_system_handle_can_be_registered() {
    struct Counter {
        hits: AtomicUsize,
    }

    impl System for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn metadata(&self) -> Option<SystemMetadata> {
            Some(SystemMetadata::new(0).reads::<Velocity>())
        }

        fn run(&self, _ctx: &TickContext) -> SystemResult {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let counter = Arc::new(Counter { hits: AtomicUsize::new(0) });
    let mut scheduler = Scheduler::new();
    scheduler.add_system(Arc::clone(&counter)).unwrap();
    scheduler.execute(0.0);
    scheduler.execute(0.0);
    assert_eq!(counter.hits.load(Ordering::SeqCst), 2);
}
