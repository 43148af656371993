//! Resolution, loading-strategy and harness tests.

use super::*;
use crate::fixtures::{insert_tags, seed, RETIRED_MODEL};
use std::time::Duration;
use tagbench_store::{
    GenericTag, Kind, NewExplicitTag, NewGenericTag, NewProfileB, NewProfileBExtra, Store,
};
use tempfile::tempdir;

fn config(per_kind: usize) -> BenchConfig {
    BenchConfig {
        per_kind,
        iterations: 2,
        warmup: 0,
        ..BenchConfig::default()
    }
}

fn prepared(config: &BenchConfig, encoding: Encoding) -> (Store, KindRegistry) {
    let store = Store::open(config.store.clone()).unwrap();
    let registry = KindRegistry::standard();
    let seeded = seed(&store, &registry, config).unwrap();
    insert_tags(&store, &seeded, config, encoding).unwrap();
    (store, registry)
}

fn extra_on_b() -> SatelliteRequest {
    SatelliteRequest::OnKind(Kind::ProfileB, Satellite::ExtraData)
}

fn sorted(mut records: Vec<OutputRecord>) -> Vec<OutputRecord> {
    records.sort();
    records
}

fn queries_for(store: &Store, registry: &KindRegistry, encoding: Encoding, plan: &LoadPlan) -> u64 {
    measure(store, || resolve_batch(store, registry, encoding, plan))
        .unwrap()
        .queries
}

// ============================================================================
// Strategy equivalence
// ============================================================================

#[test]
fn test_strategies_serialize_identically() {
    let mut cfg = config(6);
    cfg.missing_extras = 2;
    cfg.dangling_refs = 3;
    cfg.unregistered_refs = 2;
    cfg.empty_explicit = 2;

    for encoding in Encoding::ALL {
        let (store, registry) = prepared(&cfg, encoding);
        let baseline = sorted(
            serialize_batch(&store, &registry, encoding, &LoadPlan::new(Strategy::Naive)).unwrap(),
        );
        assert!(!baseline.is_empty());

        for strategy in Strategy::ALL {
            for plan in [
                LoadPlan::new(strategy),
                LoadPlan::new(strategy).with_satellite(extra_on_b()),
            ] {
                let out = sorted(serialize_batch(&store, &registry, encoding, &plan).unwrap());
                assert_eq!(out, baseline, "{encoding} / {strategy} / {:?}", plan.satellites);
            }
        }
    }
}

#[test]
fn test_encodings_agree_on_resolved_entities() {
    let cfg = config(4);
    let plan = LoadPlan::new(Strategy::BatchedDeferred);

    let (generic_store, registry) = prepared(&cfg, Encoding::Generic);
    let generic = sorted(serialize_batch(&generic_store, &registry, Encoding::Generic, &plan).unwrap());

    let (explicit_store, registry) = prepared(&cfg, Encoding::Explicit);
    let explicit =
        sorted(serialize_batch(&explicit_store, &registry, Encoding::Explicit, &plan).unwrap());

    assert_eq!(generic.len(), 16);
    assert_eq!(generic, explicit);
}

// ============================================================================
// Round-trip counts
// ============================================================================

#[test]
fn test_generic_round_trips() {
    let n = 5;
    let (store, registry) = prepared(&config(n), Encoding::Generic);
    let count = |plan: LoadPlan| queries_for(&store, &registry, Encoding::Generic, &plan);

    assert_eq!(count(LoadPlan::new(Strategy::Naive)), 1 + 9 * n as u64);
    assert_eq!(count(LoadPlan::new(Strategy::SingleJoin)), 1 + 5 * n as u64);
    assert_eq!(
        count(LoadPlan::new(Strategy::SingleJoin).with_satellite(extra_on_b())),
        1 + 4 * n as u64
    );
    assert_eq!(count(LoadPlan::new(Strategy::BatchedDeferred)), 7);
    assert_eq!(
        count(LoadPlan::new(Strategy::BatchedDeferred).with_satellite(extra_on_b())),
        7
    );
}

#[test]
fn test_explicit_round_trips() {
    let n = 5;
    let (store, registry) = prepared(&config(n), Encoding::Explicit);
    let count = |plan: LoadPlan| queries_for(&store, &registry, Encoding::Explicit, &plan);

    assert_eq!(count(LoadPlan::new(Strategy::Naive)), 1 + 5 * n as u64);
    assert_eq!(count(LoadPlan::new(Strategy::SingleJoin)), 1 + n as u64);
    assert_eq!(
        count(LoadPlan::new(Strategy::SingleJoin).with_satellite(extra_on_b())),
        1
    );
    assert_eq!(count(LoadPlan::new(Strategy::BatchedDeferred)), 6);
    assert_eq!(
        count(LoadPlan::new(Strategy::BatchedDeferred).with_satellite(extra_on_b())),
        6
    );
}

#[test]
fn test_batched_round_trips_do_not_grow_with_rows() {
    let plans = [
        LoadPlan::new(Strategy::BatchedDeferred),
        LoadPlan::new(Strategy::BatchedDeferred).with_satellite(extra_on_b()),
    ];
    for n in [3, 30, 120] {
        for (encoding, expected) in [(Encoding::Generic, 7), (Encoding::Explicit, 6)] {
            let (store, registry) = prepared(&config(n), encoding);
            for plan in &plans {
                assert_eq!(
                    queries_for(&store, &registry, encoding, plan),
                    expected,
                    "{encoding} / {n} / {:?}",
                    plan.satellites
                );
            }
        }
    }
}

#[test]
fn test_empty_batch_issues_only_the_tag_read() {
    let store = Store::open_in_memory().unwrap();
    let registry = KindRegistry::standard();
    for strategy in Strategy::ALL {
        let plan = LoadPlan::new(strategy).with_satellite(extra_on_b());
        for encoding in Encoding::ALL {
            let measured = measure(&store, || resolve_batch(&store, &registry, encoding, &plan))
                .unwrap();
            assert!(measured.result.is_empty());
            assert_eq!(measured.queries, 1, "{encoding} / {strategy}");
        }
    }
}

// ============================================================================
// Edge cases
// ============================================================================

#[test]
fn test_unknown_kind_and_dangling_target() {
    let mut cfg = config(2);
    cfg.dangling_refs = 4;
    cfg.unregistered_refs = 3;

    for strategy in Strategy::ALL {
        let (store, registry) = prepared(&cfg, Encoding::Generic);
        let out =
            serialize_batch(&store, &registry, Encoding::Generic, &LoadPlan::new(strategy)).unwrap();
        assert_eq!(out.len(), 8 + 4 + 3);

        let unknown: Vec<_> = out
            .iter()
            .filter_map(|record| match record {
                OutputRecord::Unknown {
                    raw_kind_discriminant,
                    raw_entity_id,
                    ..
                } => Some((raw_kind_discriminant.as_str(), *raw_entity_id)),
                _ => None,
            })
            .collect();
        assert_eq!(unknown.len(), 7, "{strategy}");
        assert_eq!(
            unknown.iter().filter(|(model, _)| *model == RETIRED_MODEL).count(),
            3
        );
        assert!(unknown
            .iter()
            .filter(|(model, _)| *model != RETIRED_MODEL)
            .all(|(model, id)| Kind::from_model(model).is_some() && *id > 1_000_000));
    }
}

#[test]
fn test_empty_explicit_tags_serialize_as_empty() {
    let mut cfg = config(1);
    cfg.empty_explicit = 2;
    let (store, registry) = prepared(&cfg, Encoding::Explicit);

    for strategy in Strategy::ALL {
        let out =
            serialize_batch(&store, &registry, Encoding::Explicit, &LoadPlan::new(strategy)).unwrap();
        let empties: Vec<_> = out
            .iter()
            .filter(|record| record.type_name() == "empty")
            .collect();
        assert_eq!(empties.len(), 2, "{strategy}");
    }

    let json = serde_json::to_string(&serializer::serialize(&Resolved::Empty { tag_id: 9 })).unwrap();
    assert_eq!(
        json,
        r#"{"type":"empty","id":9,"profile_a":null,"profile_b":null,"profile_c":null,"profile_d":null}"#
    );
}

#[test]
fn test_missing_relation_faults_on_mixed_batch() {
    let plan = LoadPlan::new(Strategy::Naive)
        .with_satellite(SatelliteRequest::Everywhere(Satellite::ExtraData));

    for encoding in Encoding::ALL {
        for strategy in Strategy::ALL {
            let (store, registry) = prepared(&config(2), encoding);
            let plan = LoadPlan {
                strategy,
                ..plan.clone()
            };
            let err = resolve_batch(&store, &registry, encoding, &plan).unwrap_err();
            match err {
                TagError::MissingSatelliteRelation { relation, kind } => {
                    assert_eq!(relation, Satellite::ExtraData);
                    assert_eq!(kind, Kind::ProfileA);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}

#[test]
fn test_missing_relation_message() {
    let err = TagError::MissingSatelliteRelation {
        relation: Satellite::ExtraData,
        kind: Kind::ProfileC,
    };
    assert_eq!(
        err.to_string(),
        "cannot find satellite relation 'extra_data' on kind 'profile_c'"
    );
}

#[test]
fn test_kind_scoped_request_validated_up_front() {
    let (store, registry) = prepared(&config(2), Encoding::Generic);
    let plan = LoadPlan::new(Strategy::BatchedDeferred)
        .with_satellite(SatelliteRequest::OnKind(Kind::ProfileD, Satellite::ExtraData));

    let capture = store.capture();
    let result = resolve_batch(&store, &registry, Encoding::Generic, &plan);
    assert!(matches!(
        result,
        Err(TagError::MissingSatelliteRelation {
            kind: Kind::ProfileD,
            ..
        })
    ));
    assert_eq!(capture.count(), 0, "rejected before the tag read");
}

#[test]
fn test_everywhere_succeeds_when_every_kind_declares_it() {
    let store = Store::open_in_memory().unwrap();
    let registry = KindRegistry::standard();
    let kinds = registry.sync(&store).unwrap();
    let b_kind = kinds.iter().find(|row| row.model == "profile_b").unwrap();
    let ids = store
        .bulk_insert(&[
            NewProfileB {
                name: "B0".to_string(),
                email: "fakemail@gmail.com".to_string(),
            },
            NewProfileB {
                name: "B1".to_string(),
                email: "fakemail@gmail.com".to_string(),
            },
        ])
        .unwrap();
    store
        .bulk_insert(&[NewProfileBExtra {
            profile_b_id: ids[0],
            info: "Extra info for B0".to_string(),
        }])
        .unwrap();
    let tags: Vec<_> = ids
        .iter()
        .map(|id| NewGenericTag::pointing_at(b_kind, *id))
        .collect();
    store.bulk_insert(&tags).unwrap();

    let plan = LoadPlan::new(Strategy::BatchedDeferred)
        .with_satellite(SatelliteRequest::Everywhere(Satellite::ExtraData));
    let measured = measure(&store, || {
        serialize_batch(&store, &registry, Encoding::Generic, &plan)
    })
    .unwrap();
    assert_eq!(measured.queries, 4);
    assert_eq!(measured.result.len(), 2);
}

#[test]
fn test_extension_linkage() {
    let mut cfg = config(10);
    cfg.missing_extras = 2;

    for encoding in Encoding::ALL {
        let (store, registry) = prepared(&cfg, encoding);
        for strategy in Strategy::ALL {
            let plan = LoadPlan::new(strategy).with_satellite(extra_on_b());
            let out = serialize_batch(&store, &registry, encoding, &plan).unwrap();
            let extra_of = |name: &str| {
                out.iter().find_map(|record| match record {
                    OutputRecord::ProfileB {
                        name: n,
                        extra_info,
                        ..
                    } if n == name => Some(extra_info.clone()),
                    _ => None,
                })
            };
            assert_eq!(extra_of("B7"), Some(Some("Extra info for B7".to_string())));
            assert_eq!(extra_of("B8"), Some(None));
            assert_eq!(extra_of("B9"), Some(None));
        }
    }
}

#[test]
fn test_multiple_links_resolve_to_first_kind() {
    let store = Store::open(tagbench_store::StoreConfig {
        enforce_single_link: false,
        ..Default::default()
    })
    .unwrap();
    let registry = KindRegistry::standard();
    let b = store
        .bulk_insert(&[NewProfileB {
            name: "B0".to_string(),
            email: "fakemail@gmail.com".to_string(),
        }])
        .unwrap()[0];
    let c = store
        .bulk_insert(&[tagbench_store::NewProfileC {
            name: "C0".to_string(),
            address: "123 Main St".to_string(),
        }])
        .unwrap()[0];
    let mut tag = NewExplicitTag::pointing_at(Kind::ProfileC, c);
    tag.links.set(Kind::ProfileB, Some(b));
    store.bulk_insert(&[tag]).unwrap();

    for strategy in Strategy::ALL {
        let resolved =
            resolve_explicit_batch(&store, &registry, &LoadPlan::new(strategy)).unwrap();
        assert_eq!(resolved[0].kind(), Some(Kind::ProfileB), "{strategy}");
    }
}

#[test]
fn test_serialization_is_byte_identical() {
    let mut cfg = config(3);
    cfg.unregistered_refs = 1;
    let (store, registry) = prepared(&cfg, Encoding::Generic);
    let plan = LoadPlan::new(Strategy::SingleJoin);

    let first = serialize_batch(&store, &registry, Encoding::Generic, &plan).unwrap();
    let second = serialize_batch(&store, &registry, Encoding::Generic, &plan).unwrap();
    assert_eq!(
        serializer::to_json_bytes(&first).unwrap(),
        serializer::to_json_bytes(&second).unwrap()
    );
    for record in &first {
        assert_eq!(record.to_json_bytes().unwrap(), record.to_json_bytes().unwrap());
    }

    let b = first
        .iter()
        .find(|record| record.type_name() == "profile_b")
        .unwrap();
    let json = String::from_utf8(b.to_json_bytes().unwrap()).unwrap();
    assert!(json.starts_with(r#"{"type":"profile_b","id":"#));
    assert!(json.ends_with(r#""email":"fakemail@gmail.com","extra_info":"Extra info for B0"}"#));
}

// ============================================================================
// Registry and plans
// ============================================================================

#[test]
fn test_registry_standard() {
    let registry = KindRegistry::standard();
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.kinds(), Kind::ALL.to_vec());
    assert!(registry.declares(Kind::ProfileB, Satellite::ExtraData));
    assert!(!registry.declares(Kind::ProfileA, Satellite::ExtraData));
    assert!(registry.lookup(RETIRED_MODEL).is_none());
    assert!(KindRegistry::empty().is_empty());
}

#[test]
fn test_unregistered_kind_resolves_unknown_without_fetch() {
    let (store, _) = prepared(&config(2), Encoding::Generic);
    let standard = KindRegistry::standard();
    let mut registry = KindRegistry::empty();
    for kind in [Kind::ProfileA, Kind::ProfileB] {
        registry.register(standard.entry(kind).unwrap().clone());
    }

    let resolved = resolve_generic_batch(
        &store,
        &registry,
        &LoadPlan::new(Strategy::BatchedDeferred),
    )
    .unwrap();
    let unknown = resolved
        .iter()
        .filter(|r| matches!(r, Resolved::Unknown { .. }))
        .count();
    assert_eq!(unknown, 4);
}

#[test]
fn test_missing_kind_row_keeps_kind_id() {
    let (store, registry) = prepared(&config(1), Encoding::Generic);
    let tag = GenericTag {
        id: 1,
        kind_id: 999,
        entity_id: 5,
    };

    for strategy in Strategy::ALL {
        let plan = LoadPlan::new(strategy);
        let resolved = Resolver::new(&store, &registry, &plan)
            .resolve_generic(&tag, LoadedContext::default())
            .unwrap();
        match resolved {
            Resolved::Unknown {
                tag_id,
                discriminant,
                entity_id,
            } => {
                assert_eq!(tag_id, 1);
                assert_eq!(discriminant, "999");
                assert_eq!(entity_id, 5);
            }
            other => panic!("expected unknown, got {other:?}"),
        }
    }
}

#[test]
fn test_strategy_names() {
    for strategy in Strategy::ALL {
        assert_eq!(strategy.to_string().parse::<Strategy>(), Ok(strategy));
    }
    assert_eq!("batched".parse::<Strategy>(), Ok(Strategy::BatchedDeferred));
    assert!("eager".parse::<Strategy>().is_err());
}

#[test]
fn test_plan_wants() {
    let registry = KindRegistry::standard();
    let plan = LoadPlan::new(Strategy::Naive).with_satellite(extra_on_b());
    assert!(plan.wants(&registry, Kind::ProfileB, Satellite::ExtraData).unwrap());
    assert!(!plan.wants(&registry, Kind::ProfileC, Satellite::ExtraData).unwrap());
    assert!(plan.mentions(Satellite::ExtraData));
    assert!(plan.validate(&registry).is_ok());
    assert!(!LoadPlan::new(Strategy::Naive).mentions(Satellite::ExtraData));
}

// ============================================================================
// Harness
// ============================================================================

#[test]
fn test_measure_passes_errors_through() {
    let store = Store::open_in_memory().unwrap();
    let out: Result<Measured<()>, &str> = measure(&store, || Err("boom"));
    assert_eq!(out.unwrap_err(), "boom");

    let measured = measure(&store, || Ok::<_, TagError>(store.count::<tagbench_store::ProfileA>()?))
        .unwrap();
    assert_eq!(measured.result, 0);
    assert_eq!(measured.queries, 1);
    assert_eq!(measured.statements.len(), 1);
}

#[test]
fn test_latency_recorder() {
    let mut recorder = LatencyRecorder::new().unwrap();
    assert_eq!(recorder.summary(), LatencySummary::default());
    for micros in [100, 200, 300, 400] {
        recorder.record(Duration::from_micros(micros));
    }
    recorder.record(Duration::ZERO);
    let summary = recorder.summary();
    assert_eq!(summary.samples, 5);
    assert_eq!(summary.min_us, 1);
    assert!(summary.max_us >= 400);
    assert!(summary.p50_us >= 200 && summary.p50_us <= 201);
}

#[test]
fn test_catalog() {
    let catalog = Scenario::catalog();
    assert_eq!(catalog.len(), 16);
    let mut names: Vec<_> = catalog.iter().map(|s| s.name).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 16);

    assert_eq!(
        catalog
            .iter()
            .filter(|s| s.group == ScenarioGroup::Queries)
            .count(),
        6
    );
    assert!(Scenario::by_name("generic_batched_extra_everywhere")
        .unwrap()
        .expect_fault);
    assert!(matches!(
        Scenario::by_name("nope"),
        Err(TagError::UnknownScenario(_))
    ));
}

#[test]
fn test_run_query_scenario_reports_statements() {
    let registry = KindRegistry::standard();
    let scenario = Scenario::by_name("query_generic_batched").unwrap();
    let report = run_scenario(&scenario, &registry, &config(4)).unwrap();

    assert_eq!(report.rows, 16);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.queries_min, 7);
    assert!(report.stable_queries());
    assert_eq!(report.statements.len(), 7);
    assert_eq!(report.strategy, Some(Strategy::BatchedDeferred));
    assert!(report.fault.is_none());
}

#[test]
fn test_run_insert_scenario() {
    let registry = KindRegistry::standard();
    let mut cfg = config(10);
    cfg.store.insert_chunk_rows = 15;
    let report = run_scenario(&Scenario::by_name("insert_explicit").unwrap(), &registry, &cfg)
        .unwrap();
    assert_eq!(report.rows, 40);
    assert_eq!(report.queries_max, 3);
    assert_eq!(report.latency.samples, 2);
}

#[test]
fn test_expected_fault_scenario() {
    let registry = KindRegistry::standard();
    let scenario = Scenario::by_name("generic_batched_extra_everywhere").unwrap();
    let report = run_scenario(&scenario, &registry, &config(2)).unwrap();
    assert_eq!(
        report.fault.as_deref(),
        Some("cannot find satellite relation 'extra_data' on kind 'profile_a'")
    );
    assert_eq!(report.iterations, 0);
}

#[test]
fn test_suite_with_file_backed_stores() {
    let dir = tempdir().unwrap();
    let registry = KindRegistry::standard();
    let mut cfg = config(3);
    cfg.data_dir = Some(dir.path().join("stores"));
    let scenarios = vec![
        Scenario::by_name("serialize_explicit_single_join").unwrap(),
        Scenario::by_name("serialize_generic").unwrap(),
    ];

    let suite = run_suite(&scenarios, &registry, &cfg).unwrap();
    assert_eq!(suite.scenarios.len(), 2);
    assert!(suite.scenarios.iter().all(|r| r.output_bytes > 0));
    assert!(dir
        .path()
        .join("stores")
        .join("serialize_generic.sqlite3")
        .exists());

    // A second run replaces the files rather than appending rows.
    let again = run_suite(&scenarios, &registry, &cfg).unwrap();
    assert_eq!(again.scenarios[1].rows, suite.scenarios[1].rows);

    let json = suite.to_json_pretty().unwrap();
    let parsed: SuiteReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.scenarios[0].name, "serialize_explicit_single_join");
}

#[test]
fn test_bench_config_from_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.json");
    std::fs::write(&path, r#"{"per_kind": 7, "store": {"insert_chunk_rows": 3}}"#).unwrap();

    let cfg = BenchConfig::from_json_file(&path).unwrap();
    assert_eq!(cfg.per_kind, 7);
    assert_eq!(cfg.iterations, 20);
    assert_eq!(cfg.store.insert_chunk_rows, 3);
    assert!(cfg.store.enforce_single_link);

    std::fs::write(&path, r#"{"per_kind": 1, "missing_extras": 2}"#).unwrap();
    assert!(matches!(
        BenchConfig::from_json_file(&path),
        Err(TagError::Config(_))
    ));
}
