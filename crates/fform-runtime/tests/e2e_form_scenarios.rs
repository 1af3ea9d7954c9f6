//! End-to-end form scenarios.
//!
//! Drives full engines inside a `LocalSet` on a paused tokio clock:
//! 1. A burst of writes is validated once, against the final data
//! 2. Effects cascade synchronously before validation runs
//! 3. Back-to-back submits run the action once
//! 4. A successful submit collapses history to a fresh baseline
//! 5. Action failures are captured, reported, and cleared by edits
//! 6. Lifecycle listeners fire at every call site, in order

#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use fform_core::{ErrorTree, FieldPath, Value};
use fform_runtime::{
    ActionError, ActionOutcome, Change, Engine, EngineListener, EngineOptions, Snapshot, Tracked,
};
use serde_json::json;
use tokio::task::LocalSet;

// ── Helpers ─────────────────────────────────────────────────────────────

fn path(raw: &str) -> FieldPath {
    FieldPath::parse(raw).unwrap()
}

fn str_at<'a>(data: &'a Value, raw: &str) -> Option<&'a str> {
    data.get_path(&path(raw)).and_then(Value::as_str)
}

/// Let deferred validation passes and expired timers run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn max_length_validator(calls: Rc<RefCell<Vec<Value>>>) -> impl Fn(&Value) -> ErrorTree {
    move |data: &Value| {
        calls.borrow_mut().push(data.clone());
        let name = str_at(data, "name").unwrap_or_default();
        let message = if name.trim().chars().count() > 5 {
            "Max length 5"
        } else {
            ""
        };
        ErrorTree::new().with("name", message)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Sync validation
// ═════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn scenario_a_max_length() {
    init_tracing();
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(RefCell::new(Vec::new()));
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba", "age": 10 })))
                .validate(max_length_validator(Rc::clone(&calls)))
                .build()
                .unwrap();
            assert!(!engine.has_errors());

            engine.data().set("name", "Csabacska").unwrap();
            settle().await;

            assert_eq!(
                engine.errors().message_at(&path("name")),
                Some("Max length 5")
            );
            assert!(engine.has_errors());
            assert!(engine.has_combined_errors());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn burst_is_validated_once_against_final_state() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(RefCell::new(Vec::new()));
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .validate(max_length_validator(Rc::clone(&calls)))
                .build()
                .unwrap();
            assert_eq!(calls.borrow().len(), 1);

            let data = engine.data();
            for name in ["C", "Cs", "Csabacska", "Ann"] {
                data.set("name", name).unwrap();
            }
            settle().await;

            assert_eq!(calls.borrow().len(), 2);
            assert_eq!(str_at(&calls.borrow()[1], "name"), Some("Ann"));
            assert!(!engine.has_errors());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn debounced_validation_waits_for_quiet() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(RefCell::new(Vec::new()));
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .validate(max_length_validator(Rc::clone(&calls)))
                .options(EngineOptions::default().with_debounce_validation_ms(100))
                .build()
                .unwrap();

            let data = engine.data();
            data.set("name", "Csabacska").unwrap();
            tokio::time::sleep(Duration::from_millis(60)).await;
            data.set("name", "Csabacskaa").unwrap();
            tokio::time::sleep(Duration::from_millis(60)).await;
            assert_eq!(calls.borrow().len(), 1);
            assert!(!engine.has_errors());

            tokio::time::sleep(Duration::from_millis(60)).await;
            assert_eq!(calls.borrow().len(), 2);
            assert!(engine.has_errors());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn unchanged_write_schedules_nothing() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(RefCell::new(Vec::new()));
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .validate(max_length_validator(Rc::clone(&calls)))
                .build()
                .unwrap();
            assert_eq!(engine.data().set("name", "Csaba"), Ok(false));
            settle().await;
            assert_eq!(calls.borrow().len(), 1);
            assert!(!engine.is_dirty());
        })
        .await;
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Effects
// ═════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn scenario_b_effect_cascade() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(RefCell::new(Vec::new()));
            let engine = Engine::builder(Value::from(json!({
                "name": "Csaba",
                "age": 10,
                "address": { "zip": "1010" }
            })))
            .validate(max_length_validator(Rc::clone(&calls)))
            .effect(|cx| {
                let data = cx.data();
                match cx.change().path.as_str() {
                    "name" => {
                        let len = cx.change().new_value.as_str().map_or(0, |s| s.chars().count());
                        data.set("age", len * 2).unwrap();
                    }
                    "age" => {
                        let age = cx.change().new_value.as_i64().unwrap_or(0);
                        data.set("address.zip", (1000 + age).to_string()).unwrap();
                    }
                    _ => {}
                }
            })
            .build()
            .unwrap();

            let data = engine.data();
            data.set("name", "Ann").unwrap();

            assert_eq!(data.get("age"), Some(Value::from(6)));
            assert_eq!(data.get("address.zip"), Some(Value::from("1006")));
            assert_eq!(calls.borrow().len(), 1, "validator must not have run yet");

            settle().await;
            assert_eq!(calls.borrow().len(), 2);
            assert_eq!(str_at(&calls.borrow()[1], "address.zip"), Some("1006"));
        })
        .await;
}

// ═════════════════════════════════════════════════════════════════════════
// 3–4. Action execution
// ═════════════════════════════════════════════════════════════════════════

type SubmitFuture = Pin<Box<dyn Future<Output = Result<(), ActionError>>>>;

fn slow_submit(invocations: Rc<Cell<u32>>) -> impl Fn(Tracked, Value) -> SubmitFuture {
    move |data: Tracked, _params: Value| {
        invocations.set(invocations.get() + 1);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            data.set("id", 42).unwrap();
            Ok(())
        })
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_c_single_flight() {
    LocalSet::new()
        .run_until(async {
            let invocations = Rc::new(Cell::new(0));
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .action(slow_submit(Rc::clone(&invocations)))
                .build()
                .unwrap();

            let transitions = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&transitions);
            let _sub = engine
                .signals()
                .action_in_progress
                .subscribe(move |v| sink.borrow_mut().push(*v));

            let (first, second) =
                tokio::join!(engine.execute(Value::Null), engine.execute(Value::Null));

            assert_eq!(first, ActionOutcome::Completed);
            assert_eq!(second, ActionOutcome::Ignored);
            assert_eq!(invocations.get(), 1);
            assert_eq!(*transitions.borrow(), vec![true, false]);
            assert!(!engine.action_in_progress());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_actions_when_allowed() {
    LocalSet::new()
        .run_until(async {
            let invocations = Rc::new(Cell::new(0));
            let engine = Engine::builder(Value::from(json!({})))
                .action(slow_submit(Rc::clone(&invocations)))
                .options(EngineOptions::default().with_allow_concurrent_actions(true))
                .build()
                .unwrap();
            let (a, b) = tokio::join!(engine.execute(1), engine.execute(2));
            assert_eq!((a, b), (ActionOutcome::Completed, ActionOutcome::Completed));
            assert_eq!(invocations.get(), 2);
            assert!(!engine.action_in_progress());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn scenario_d_success_collapses_history() {
    LocalSet::new()
        .run_until(async {
            let invocations = Rc::new(Cell::new(0));
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .action(slow_submit(Rc::clone(&invocations)))
                .build()
                .unwrap();
            engine.data().set("name", "Ann").unwrap();
            engine.snapshot("edited", true);
            assert_eq!(engine.snapshots().len(), 2);
            assert!(engine.is_dirty());

            assert_eq!(engine.execute(Value::Null).await, ActionOutcome::Completed);

            let snapshots = engine.snapshots();
            assert_eq!(snapshots.len(), 1);
            assert_eq!(snapshots[0].title, "Initial");
            assert_eq!(snapshots[0].data, Value::from(json!({ "name": "Ann", "id": 42 })));
            assert!(!engine.is_dirty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn dirty_survives_success_when_policy_off() {
    LocalSet::new()
        .run_until(async {
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .action(|_, _| async { Ok(()) })
                .options(EngineOptions::default().with_reset_dirty_on_action(false))
                .build()
                .unwrap();
            engine.data().set("name", "Ann").unwrap();
            engine.execute(Value::Null).await;
            assert!(engine.is_dirty());
            assert_eq!(engine.snapshots().len(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn execute_without_action_is_ignored() {
    LocalSet::new()
        .run_until(async {
            let engine = Engine::new(Value::from(json!({}))).unwrap();
            assert_eq!(engine.execute(Value::Null).await, ActionOutcome::Ignored);
        })
        .await;
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Action failures
// ═════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn failure_is_captured_and_cleared_by_edit() {
    LocalSet::new()
        .run_until(async {
            let reported = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&reported);
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .action(|_, _| async { Err(ActionError::message("server down")) })
                .on_done(move |error| sink.borrow_mut().push(error.map(ToString::to_string)))
                .build()
                .unwrap();
            engine.data().set("name", "Ann").unwrap();
            engine.snapshot("edited", true);

            assert_eq!(engine.execute(Value::Null).await, ActionOutcome::Failed);
            assert_eq!(*reported.borrow(), vec![Some("server down".to_owned())]);
            assert_eq!(
                engine.action_error().map(|e| e.to_string()),
                Some("server down".to_owned())
            );
            assert!(!engine.action_in_progress());
            assert_eq!(engine.snapshots().len(), 2, "failure keeps history");
            assert!(engine.is_dirty());

            engine.data().set("name", "Bob").unwrap();
            assert_eq!(engine.action_error(), None);

            // The engine stays usable.
            assert_eq!(engine.execute(Value::Null).await, ActionOutcome::Failed);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn persisted_failure_survives_edits() {
    LocalSet::new()
        .run_until(async {
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .action(|_, _| async { Err(ActionError::message("nope")) })
                .options(EngineOptions::default().with_persist_action_error(true))
                .build()
                .unwrap();
            engine.execute(Value::Null).await;
            engine.data().set("name", "Ann").unwrap();
            assert!(engine.action_error().is_some());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn unrecognized_rejection_is_reported_not_stored() {
    LocalSet::new()
        .run_until(async {
            let reported = Rc::new(Cell::new(false));
            let sink = Rc::clone(&reported);
            let engine = Engine::builder(Value::from(json!({})))
                .action(|_, _| async { Err(ActionError::rejected(json!({ "code": 7 }))) })
                .on_done(move |error| sink.set(matches!(error, Some(ActionError::Rejected(_)))))
                .build()
                .unwrap();
            assert_eq!(engine.execute(Value::Null).await, ActionOutcome::Failed);
            assert!(reported.get());
            assert_eq!(engine.action_error(), None);
        })
        .await;
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Lifecycle listeners
// ═════════════════════════════════════════════════════════════════════════

struct Recorder(Rc<RefCell<Vec<String>>>);

impl Recorder {
    fn log(&self, line: impl Into<String>) {
        self.0.borrow_mut().push(line.into());
    }
}

impl EngineListener for Recorder {
    fn on_init(&self, _data: &Tracked) {
        self.log("init");
    }
    fn on_change(&self, _data: &Tracked, change: &Change) {
        self.log(format!("change:{}", change.path));
    }
    fn on_validate(&self, errors: &ErrorTree) {
        self.log(format!("validate:{}", errors.error_count()));
    }
    fn on_snapshot(&self, snapshot: &Snapshot) {
        self.log(format!("snapshot:{}", snapshot.title));
    }
    fn on_action_start(&self, params: &Value) {
        self.log(format!("action_start:{params}"));
    }
    fn on_action_end(&self, error: Option<&ActionError>) {
        self.log(format!("action_end:{}", error.is_some()));
    }
    fn on_rollback(&self, steps: usize, target: &Snapshot) {
        self.log(format!("rollback:{steps}:{}", target.title));
    }
    fn on_reset(&self, baseline: &Snapshot) {
        self.log(format!("reset:{}", baseline.title));
    }
    fn on_destroy(&self) {
        self.log("destroy");
    }
}

#[tokio::test(start_paused = true)]
async fn listeners_fire_at_every_call_site() {
    LocalSet::new()
        .run_until(async {
            let log = Rc::new(RefCell::new(Vec::new()));
            let engine = Engine::builder(Value::from(json!({ "name": "Csaba" })))
                .validate(|_| ErrorTree::new())
                .action(|_, _| async { Ok(()) })
                .listener(Recorder(Rc::clone(&log)))
                .build()
                .unwrap();

            engine.data().set("name", "Ann").unwrap();
            engine.snapshot("one", true);
            engine.snapshot("two", true);
            settle().await;
            engine.rollback(1);
            engine.reset();
            engine.execute(5).await;
            drop(engine);

            assert_eq!(
                *log.borrow(),
                vec![
                    "validate:0",
                    "init",
                    "change:name",
                    "snapshot:one",
                    "snapshot:two",
                    "validate:0",
                    "validate:0",
                    "rollback:1:one",
                    "validate:0",
                    "reset:Initial",
                    "action_start:5",
                    "action_end:false",
                    "destroy",
                ]
            );
        })
        .await;
}
