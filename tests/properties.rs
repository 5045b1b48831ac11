//! Quantified invariants over randomized operation sequences and inputs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;
use serde_json::{json, Value};

use activisor::{
    ActivityManager, Bus, Completion, Concurrency, ConnectivityProvider, ManagerConfig,
    ProviderRegistry, ResourceAssociations, WhereMatcher,
};

fn fresh_manager(bg: u32, bgi: u32) -> ActivityManager {
    let mut config = ManagerConfig::default();
    config.background_concurrency = Concurrency::Limited(bg);
    config.background_interactive_concurrency = Concurrency::Limited(bgi);

    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(ConnectivityProvider::new()));

    let mut manager = ActivityManager::new(
        &config,
        registry,
        Arc::new(ResourceAssociations::new()),
        Bus::new(4096),
    );
    manager.enable_providers();
    manager
}

#[derive(Debug, Clone)]
enum Op {
    Create { interactive: bool },
    Start(u8),
    Cancel(u8),
    Complete(u8),
    Release(u8),
    Connectivity(bool),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(|interactive| Op::Create { interactive }),
        any::<u8>().prop_map(Op::Start),
        any::<u8>().prop_map(Op::Cancel),
        any::<u8>().prop_map(Op::Complete),
        any::<u8>().prop_map(Op::Release),
        any::<bool>().prop_map(Op::Connectivity),
    ]
}

/// Applies ops, returning `(id, name)` pairs of every created activity.
fn apply(manager: &mut ActivityManager, ops: &[Op]) -> Vec<(u64, String)> {
    let now = Utc::now();
    let mut created: Vec<(u64, String)> = Vec::new();
    let mut counter = 0u32;

    for op in ops {
        match op {
            Op::Create { interactive } => {
                counter += 1;
                let name = format!("act{counter}");
                let definition = serde_json::from_value(json!({
                    "name": name,
                    "creator": {"type": "named", "id": "com.example.prop"},
                    "flags": {"userInitiated": interactive}
                }))
                .expect("definition");
                if let Ok(id) = manager.create(definition, now) {
                    created.push((id, name));
                }
            }
            Op::Start(pick) => {
                if let Some((id, _)) = pick_from(&created, *pick) {
                    let _ = manager.start(id, now);
                }
            }
            Op::Cancel(pick) => {
                if let Some((id, _)) = pick_from(&created, *pick) {
                    let _ = manager.cancel(id, now);
                }
            }
            Op::Complete(pick) => {
                if let Some((id, _)) = pick_from(&created, *pick) {
                    let _ = manager.complete(id, now);
                }
            }
            Op::Release(pick) => {
                if let Some((id, _)) = pick_from(&created, *pick) {
                    let _ = manager.release(id, now);
                }
            }
            Op::Connectivity(up) => {
                manager.ingest_provider(
                    "connectivity",
                    Completion::Ok(json!({ "isInternetConnectionAvailable": up })),
                );
            }
        }
    }

    created
}

fn pick_from(created: &[(u64, String)], pick: u8) -> Option<(u64, String)> {
    if created.is_empty() {
        None
    } else {
        Some(created[pick as usize % created.len()].clone())
    }
}

fn queue_ids(listing: &Value) -> HashMap<String, Vec<u64>> {
    let mut out = HashMap::new();
    for entry in listing["queues"].as_array().into_iter().flatten() {
        let name = entry["name"].as_str().unwrap_or_default().to_string();
        let ids = entry["activities"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|activity| activity["activityId"].as_u64())
            .collect();
        out.insert(name, ids);
    }
    out
}

proptest! {
    /// An activity appears on at most one run queue at any observable moment.
    #[test]
    fn queue_membership_is_mutually_exclusive(
        ops in prop::collection::vec(arb_op(), 0..40),
        bg in 1u32..4,
    ) {
        let mut manager = fresh_manager(bg, bg);
        apply(&mut manager, &ops);

        let listing = manager.info();
        let mut seen = HashSet::new();
        for ids in queue_ids(&listing).values() {
            for id in ids {
                prop_assert!(seen.insert(*id), "activity {id} on more than one queue");
            }
        }
    }

    /// The running background population never exceeds the concurrency level.
    #[test]
    fn concurrency_cap_is_never_exceeded(
        ops in prop::collection::vec(arb_op(), 0..40),
        bg in 1u32..4,
        slack in 0u32..3,
    ) {
        // Interactive admissions check their own (lower or equal) level, so
        // the background level bounds the total.
        let bgi = bg.saturating_sub(slack).max(1);
        let mut manager = fresh_manager(bg, bgi);
        apply(&mut manager, &ops);

        let queues = queue_ids(&manager.info());
        let empty = Vec::new();
        let running = queues.get("background").unwrap_or(&empty).len()
            + queues.get("backgroundInteractive").unwrap_or(&empty).len();
        prop_assert!(
            running <= bg as usize,
            "{running} running with a level of {bg}"
        );
    }

    /// The id table and the name table never disagree for queue residents,
    /// and leaked activities never sit on a queue.
    #[test]
    fn id_and_name_tables_agree(
        ops in prop::collection::vec(arb_op(), 0..40),
    ) {
        let mut manager = fresh_manager(2, 2);
        let created = apply(&mut manager, &ops);
        let names: HashMap<u64, String> = created.into_iter().collect();

        let leaked: HashSet<u64> = manager.leaked().into_iter().collect();
        let creator = activisor::BusId::named("com.example.prop");

        for ids in queue_ids(&manager.info()).values() {
            for id in ids {
                prop_assert!(!leaked.contains(id), "leaked activity {id} on a queue");
                let name = names.get(id).expect("queue resident was created here");
                prop_assert_eq!(manager.lookup(name, &creator).ok(), Some(*id));
            }
        }
    }
}

// ---------------------------
// Where-matcher properties
// ---------------------------

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        (-100i64..100).prop_map(Value::from),
        "[a-z]{0,4}".prop_map(Value::from),
    ]
}

fn arb_payload() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[abc]", arb_scalar(), 0..4).prop_map(|map| json!(map))
}

fn arb_clause() -> impl Strategy<Value = Value> {
    let comparison = (
        "[abc]",
        prop_oneof![
            Just("<"),
            Just("<="),
            Just("="),
            Just("!="),
            Just(">="),
            Just(">"),
        ],
        arb_scalar(),
    )
        .prop_map(|(prop, op, val)| json!({"prop": prop, "op": op, "val": val}));

    comparison.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(|clauses| json!({"and": clauses})),
            prop::collection::vec(inner, 1..4).prop_map(|clauses| json!({"or": clauses})),
        ]
    })
}

proptest! {
    /// Evaluation is a pure function: repeated evaluation yields the same
    /// result, and an `and`-wrapper around a clause changes nothing.
    #[test]
    fn matcher_evaluation_is_pure(clause in arb_clause(), payload in arb_payload()) {
        let matcher = WhereMatcher::new(clause.clone()).expect("generated clause is valid");
        let first = matcher.evaluate(&payload);
        for _ in 0..3 {
            prop_assert_eq!(matcher.evaluate(&payload), first);
        }

        let wrapped = WhereMatcher::new(json!({"and": [clause]})).expect("wrapped clause");
        prop_assert_eq!(wrapped.evaluate(&payload), first);
    }
}

// ---------------------------
// Confidence ordering property
// ---------------------------

const LEVELS: [&str; 4] = ["none", "poor", "fair", "excellent"];

fn level_rank(level: &str) -> i32 {
    LEVELS
        .iter()
        .position(|candidate| *candidate == level)
        .map(|position| position as i32)
        .unwrap_or(-1)
}

proptest! {
    /// A confidence requirement of level L is met iff the current level C
    /// satisfies C >= L in `unknown < none < poor < fair < excellent`.
    #[test]
    fn confidence_requirement_met_iff_current_at_least_requested(
        requested in 0usize..4,
        current in prop_oneof![Just("unknown"), Just("none"), Just("poor"), Just("fair"), Just("excellent")],
    ) {
        let mut manager = fresh_manager(4, 4);
        let now = Utc::now();

        let definition = serde_json::from_value(json!({
            "name": "gated",
            "creator": {"type": "named", "id": "com.example.prop"},
            "requirements": {"wifiConfidence": LEVELS[requested]}
        }))
        .expect("definition");
        let id = manager.create(definition, now).expect("create");
        manager.start(id, now).expect("start");

        let payload = if current == "unknown" {
            json!({ "isInternetConnectionAvailable": false })
        } else {
            json!({
                "isInternetConnectionAvailable": true,
                "wifi": {
                    "state": "connected",
                    "onInternet": "yes",
                    "networkConfidenceLevel": current
                }
            })
        };
        manager.ingest_provider("connectivity", Completion::Ok(payload));

        let met = level_rank(current) >= requested as i32;
        let queues = queue_ids(&manager.info());
        let empty = Vec::new();
        let running = queues.get("background").unwrap_or(&empty).contains(&id);
        prop_assert_eq!(running, met, "requested {} with current {}", LEVELS[requested], current);
    }
}
