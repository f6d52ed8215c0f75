//! End-to-end correlation tests: callback streams in, result documents out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use casetrail_core::{
    read_result, ConfigurationPhase, Correlator, Event, FixedLocation, LifecycleCallback, Registry,
    RunLayout, TestStatus, TrailConfig, CONFIGURATION_SOURCE, INFO, SEVERE,
};

fn correlator() -> (tempfile::TempDir, Arc<Correlator>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = RunLayout::create(dir.path(), chrono::Local::now()).expect("layout");
    let registry = Arc::new(Registry::with_layout(layout, "it"));
    (dir, Arc::new(Correlator::new(registry)))
}

#[test]
fn failed_test_with_one_event() {
    let (_dir, c) = correlator();
    c.on_run_start();
    c.on_case_start("T1");
    c.on_event("step1", INFO);
    c.on_status(TestStatus::Failed);
    c.on_case_end();
    let handle = c.on_run_end().expect("run end");

    let run = read_result(handle.document.parent().unwrap()).expect("read back");
    assert_eq!(run.cases.len(), 1);
    let case = &run.cases[0];
    assert_eq!(case.name, "T1");
    assert_eq!(case.status, TestStatus::Failed);
    assert_eq!(case.events.len(), 1);
    assert_eq!(case.events[0].content, "step1");
    assert!(run.start_time.is_some() && run.end_time.is_some());
}

#[test]
fn before_method_merges_into_following_test() {
    let (_dir, c) = correlator();
    c.on_run_start();
    c.on_configuration_start("beforeMethod", ConfigurationPhase::BEFORE_METHOD);
    c.on_case_start("T2");
    c.on_event("inside T2", INFO);
    c.on_case_end();
    c.on_run_end().expect("run end");

    let run = c.registry().current_run();
    assert_eq!(run.cases.len(), 1);
    let case = &run.cases[0];
    assert_eq!(case.name, "T2");
    assert!(!case.is_configuration_phase);
    let sources: Vec<&str> = case.events.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(sources[0], CONFIGURATION_SOURCE);
    assert_eq!(case.events.last().unwrap().content, "inside T2");
}

#[test]
fn completed_before_method_merges_with_events_in_order() {
    let (_dir, c) = correlator();
    c.on_configuration_start("Suite.login", ConfigurationPhase::BEFORE_METHOD);
    c.on_event("typed password", INFO);
    c.on_configuration_end(ConfigurationPhase::BEFORE_METHOD, TestStatus::Passed);
    c.on_case_start("Suite.checkout");
    c.on_event("clicked pay", INFO);
    c.on_case_end();

    let run = c.registry().current_run();
    assert_eq!(run.cases.len(), 1);
    let contents: Vec<&str> = run.cases[0].events.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(
        contents,
        [
            "before-method configuration Suite.login started",
            "typed password",
            "before-method configuration finished: PASSED",
            "clicked pay",
        ]
    );
    let times: Vec<_> = run.cases[0].events.iter().map(Event::timestamp).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn consecutive_before_methods_make_two_cases() {
    let (_dir, c) = correlator();
    c.on_run_start();
    c.on_configuration_start("setUpA", ConfigurationPhase::BEFORE_METHOD);
    c.on_configuration_end(ConfigurationPhase::BEFORE_METHOD, TestStatus::Passed);
    c.on_configuration_start("setUpB", ConfigurationPhase::BEFORE_METHOD);
    c.on_configuration_end(ConfigurationPhase::BEFORE_METHOD, TestStatus::Passed);
    c.on_run_end().expect("run end");

    let run = c.registry().current_run();
    assert_eq!(run.cases.len(), 2);
    assert!(run.cases.iter().all(|case| case.is_configuration_phase));
    assert_eq!(run.cases[0].name, "setUpA");
    assert_eq!(run.cases[1].name, "setUpB");
}

#[test]
fn status_after_end_does_not_alter_sealed_case() {
    let (_dir, c) = correlator();
    c.on_case_start("T1");
    let handle = c.current_case().unwrap();
    c.on_case_end();
    let sealed = c.registry().case(handle).unwrap();

    c.on_status(TestStatus::Failed);
    c.on_event("late", SEVERE);

    let after = c.registry().case(handle).unwrap();
    assert_eq!(after.status, TestStatus::Passed);
    assert_eq!(after.end_time, sealed.end_time);
    assert!(after.events.is_empty());
}

#[derive(Debug, Clone, Copy)]
enum Unit {
    Test,
    BeforeMethod,
    AfterMethod,
    BeforeClass,
    AfterClass,
    BeforeTest,
}

const UNITS: [Unit; 6] = [
    Unit::Test,
    Unit::BeforeMethod,
    Unit::AfterMethod,
    Unit::BeforeClass,
    Unit::AfterClass,
    Unit::BeforeTest,
];

fn drive(c: &Correlator, unit: Unit, n: usize) {
    let phase = match unit {
        Unit::Test => {
            c.on_case_start(&format!("Suite.t{n}"));
            c.on_event("step", INFO);
            c.on_case_end();
            return;
        }
        Unit::BeforeMethod => ConfigurationPhase::BEFORE_METHOD,
        Unit::AfterMethod => ConfigurationPhase::AFTER_METHOD,
        Unit::BeforeClass => ConfigurationPhase::BEFORE_CLASS,
        Unit::AfterClass => ConfigurationPhase::AFTER_CLASS,
        Unit::BeforeTest => ConfigurationPhase::BEFORE_TEST,
    };
    c.on_configuration_start(&format!("Suite.cfg{n}"), phase);
    c.on_configuration_end(phase, TestStatus::Passed);
}

fn expected_cases(units: &[Unit]) -> usize {
    units
        .iter()
        .enumerate()
        .filter(|(i, unit)| {
            let merges = matches!(unit, Unit::BeforeMethod)
                && matches!(units.get(i + 1), Some(Unit::Test));
            !merges
        })
        .count()
}

/// Every well-formed stream of up to three units yields one case per test
/// and per configuration phase, except before-methods that a test absorbs.
#[test]
fn case_count_matches_well_formed_streams() {
    let mut streams: Vec<Vec<Unit>> = vec![vec![]];
    for _ in 0..3 {
        let longer: Vec<Vec<Unit>> = streams
            .iter()
            .filter(|s| s.len() == streams.last().map_or(0, Vec::len))
            .flat_map(|s| {
                UNITS.iter().map(move |u| {
                    let mut next = s.clone();
                    next.push(*u);
                    next
                })
            })
            .collect();
        streams.extend(longer);
    }

    for stream in &streams {
        let (_dir, c) = correlator();
        c.on_run_start();
        for (n, unit) in stream.iter().enumerate() {
            drive(&c, *unit, n);
        }
        c.on_run_end().expect("run end");

        let run = c.registry().current_run();
        assert_eq!(
            run.cases.len(),
            expected_cases(stream),
            "stream {stream:?}"
        );
    }
}

#[test]
fn persisted_document_round_trips_every_field() {
    let (dir, c) = correlator();
    let shot = dir.path().join("raw.png");
    std::fs::write(&shot, b"\x89PNG").unwrap();

    c.on_run_start();
    c.on_configuration_start("Suite.init", ConfigurationPhase::BEFORE_CLASS);
    c.on_configuration_end(ConfigurationPhase::BEFORE_CLASS, TestStatus::Skipped);
    c.on_case_start("Suite.t1");
    let handle = c.current_case().unwrap();
    let trace_id = c.registry().trace_id(handle).unwrap();
    c.dispatch(LifecycleCallback::Action {
        command: "get".to_string(),
        param: Some("https://example.com".to_string()),
        locator: None,
        screenshot: Some(shot.clone()),
        sequence: Some(1),
    })
    .unwrap();
    c.on_status(TestStatus::Failed);
    c.on_case_end();
    let artifact = c.on_run_end().expect("run end");

    let written = c.registry().current_run();
    let read = read_result(artifact.document.parent().unwrap()).expect("read back");
    assert_eq!(read, written);
    assert_eq!(read.cases[1].trace_id(), Some(trace_id.as_str()));

    let evidence = read.cases[1].events[0].evidence().unwrap();
    assert!(evidence.starts_with(&artifact.evidence_dir));
    assert!(evidence.ends_with("Suite.t1-00001.png"));
    assert!(evidence.exists());
    assert!(!shot.exists());
}

#[test]
fn two_runs_under_one_root_keep_separate_documents() {
    let dir = tempfile::tempdir().unwrap();
    let location = FixedLocation(dir.path().to_path_buf());
    let config = TrailConfig::default();

    let a = Registry::new(&location, &config).expect("run A");
    let b = Registry::new(&location, &config).expect("run B");
    a.open_case("A", false);
    b.open_case("B", false);
    let doc_a = a.persist().expect("persist A");
    let doc_b = b.persist().expect("persist B");

    assert_ne!(doc_a.document, doc_b.document);
    let read_a = read_result(doc_a.document.parent().unwrap()).expect("read A");
    let read_b = read_result(doc_b.document.parent().unwrap()).expect("read B");
    assert_eq!(read_a.cases[0].name, "A");
    assert_eq!(read_b.cases[0].name, "B");
}

#[test]
fn replayed_actions_without_sequence_keep_every_screenshot() {
    let (dir, c) = correlator();
    let first = dir.path().join("first.png");
    let second = dir.path().join("second.png");
    std::fs::write(&first, b"AAA").unwrap();
    std::fs::write(&second, b"BBB").unwrap();

    c.on_case_start("T1");
    for shot in [&first, &second] {
        c.dispatch(LifecycleCallback::Action {
            command: "click".to_string(),
            param: None,
            locator: None,
            screenshot: Some(shot.clone()),
            sequence: None,
        })
        .unwrap();
    }
    c.on_case_end();
    let artifact = c.on_run_end().expect("run end");

    assert_eq!(artifact.relocation.relocated, 2);
    let run = c.registry().current_run();
    let a = run.cases[0].events[0].evidence().unwrap();
    let b = run.cases[0].events[1].evidence().unwrap();
    assert_ne!(a, b);
    assert_eq!(std::fs::read(a).unwrap(), b"AAA");
    assert_eq!(std::fs::read(b).unwrap(), b"BBB");
}

#[test]
fn same_named_cases_keep_their_own_screenshots() {
    let (dir, c) = correlator();
    for (row, bytes) in [(0, b"AAA"), (1, b"BBB")] {
        let shot = dir.path().join(format!("row{row}.png"));
        std::fs::write(&shot, bytes).unwrap();
        c.on_case_start("Suite.dataDriven");
        c.dispatch(LifecycleCallback::Action {
            command: "click".to_string(),
            param: None,
            locator: None,
            screenshot: Some(shot),
            sequence: Some(1),
        })
        .unwrap();
        c.on_case_end();
    }
    let artifact = c.on_run_end().expect("run end");

    assert_eq!(artifact.relocation.relocated, 2);
    assert_eq!(artifact.relocation.failed, 0);
    let run = c.registry().current_run();
    let first = run.cases[0].events[0].evidence().unwrap();
    let second = run.cases[1].events[0].evidence().unwrap();
    assert_eq!(std::fs::read(first).unwrap(), b"AAA");
    assert_eq!(std::fs::read(second).unwrap(), b"BBB");
}

#[test]
fn concurrent_threads_keep_independent_timelines() {
    let (_dir, c) = correlator();
    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));

    let joins: Vec<_> = (0..workers)
        .map(|w| {
            let c = Arc::clone(&c);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for t in 0..5 {
                    let name = format!("w{w}.t{t}");
                    c.on_configuration_start(&format!("w{w}.setUp"), ConfigurationPhase::BEFORE_METHOD);
                    c.on_configuration_end(ConfigurationPhase::BEFORE_METHOD, TestStatus::Passed);
                    c.on_case_start(&name);
                    for step in 0..3 {
                        c.on_event(&format!("{name}:{step}"), INFO);
                    }
                    c.on_case_end();
                }
            })
        })
        .collect();
    for join in joins {
        join.join().unwrap();
    }

    let run = c.registry().current_run();
    assert_eq!(run.cases.len(), workers * 5);
    for case in &run.cases {
        let mine: Vec<&Event> = case
            .events
            .iter()
            .filter(|e| e.source != CONFIGURATION_SOURCE)
            .collect();
        assert_eq!(mine.len(), 3, "case {}", case.name);
        assert!(mine
            .iter()
            .all(|e| e.content.starts_with(&format!("{}:", case.name))));
    }
}

#[test]
fn global_registry_is_built_once() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let builds = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let joins: Vec<_> = (0..8)
        .map(|_| {
            let root = root.clone();
            let builds = Arc::clone(&builds);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                Registry::global_or_init(|| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Registry::new(&FixedLocation(root), &TrailConfig::default())
                })
                .expect("global registry")
            })
        })
        .collect();
    let registries: Vec<Arc<Registry>> = joins.into_iter().map(|j| j.join().unwrap()).collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(registries.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert!(Arc::ptr_eq(&registries[0], &Registry::global().unwrap()));
}
