use std::sync::Arc;

use dnstrigd::config::DaemonConfig;
use dnstrigd::engine::{RetryScheduler, StateEngine};
use dnstrigd::probe::{HttpProbeOutcome, ProbeEntry, ProbeKind};
use dnstrigd::resolver::{NoopPlatformHooks, ResolverHookArbiter};
use dnstrigd::update::NoopUpdateNotifier;

fn make_engine(resolvconf: &str) -> Arc<StateEngine> {
    let config = DaemonConfig {
        resolvconf: resolvconf.to_string(),
        ..DaemonConfig::default()
    };
    let arbiter = ResolverHookArbiter::new(&config, Box::new(NoopPlatformHooks));
    let retry = Arc::new(RetryScheduler::new(
        config.retry.clone(),
        Arc::new(tokio::sync::Notify::new()),
    ));
    Arc::new(StateEngine::new(
        arbiter,
        retry,
        Box::new(NoopUpdateNotifier),
        true,
    ))
}

fn working_cache(ip: &str) -> ProbeEntry {
    let mut p = ProbeEntry::new(ip, ProbeKind::Cache, 53);
    p.finished = true;
    p.works = true;
    p
}

fn failing_cache(ip: &str) -> ProbeEntry {
    let mut p = ProbeEntry::new(ip, ProbeKind::Cache, 53);
    p.finished = true;
    p.works = false;
    p
}

#[test]
fn healthy_cache_reaches_secure_cache_state() {
    let engine = make_engine("/tmp/dnstrigd_scenario_healthy.conf");
    engine.complete_sweep(
        vec![working_cache("192.0.2.1")],
        HttpProbeOutcome::NotRun,
        "2026-07-31 00:00:00".to_string(),
    );

    let block = engine.render_results_block();
    assert!(block.contains("cache 192.0.2.1: OK"));
    assert!(block.contains("state: cache secure"));
}

#[test]
fn all_dark_then_user_accepts_insecure() {
    let engine = make_engine("/tmp/dnstrigd_scenario_dark.conf");
    engine.complete_sweep(
        vec![failing_cache("192.0.2.1")],
        HttpProbeOutcome::CaptivePortal,
        "2026-07-31 00:00:00".to_string(),
    );
    let block = engine.render_results_block();
    assert!(block.contains("state: dark secure"));

    engine.set_insecure(true);
    let block = engine.render_results_block();
    assert!(block.contains("state: dark insecure_mode"));
}

#[test]
fn insecure_yes_then_no_round_trips_to_secure() {
    let engine = make_engine("/tmp/dnstrigd_scenario_roundtrip.conf");
    engine.complete_sweep(
        vec![failing_cache("192.0.2.1")],
        HttpProbeOutcome::CaptivePortal,
        "2026-07-31 00:00:00".to_string(),
    );
    engine.set_insecure(true);
    assert!(engine.render_results_block().contains("insecure_mode"));

    engine.set_insecure(false);
    assert!(engine.render_results_block().contains("state: dark secure"));
}

#[test]
fn hotspot_signon_sets_forced_insecure_and_reprobe_clears_it() {
    let engine = make_engine("/tmp/dnstrigd_scenario_hotspot.conf");
    engine.complete_sweep(
        vec![failing_cache("192.0.2.1")],
        HttpProbeOutcome::CaptivePortal,
        "2026-07-31 00:00:00".to_string(),
    );

    engine.hotspot_signon();
    let block = engine.render_results_block();
    assert!(block.contains("forced_insecure"));

    engine.begin_reprobe();
    engine.complete_sweep(
        vec![working_cache("192.0.2.1")],
        HttpProbeOutcome::NotRun,
        "2026-07-31 00:01:00".to_string(),
    );
    let block = engine.render_results_block();
    assert!(!block.contains("forced_insecure"));
}

#[test]
fn skip_http_is_sticky_until_non_dark_state() {
    let engine = make_engine("/tmp/dnstrigd_scenario_skiphttp.conf");
    engine.set_skip_http();
    assert!(engine.skip_http());

    engine.complete_sweep(
        vec![failing_cache("192.0.2.1")],
        HttpProbeOutcome::CaptivePortal,
        "2026-07-31 00:00:00".to_string(),
    );
    assert!(engine.skip_http(), "skip_http must survive a dark sweep");

    engine.complete_sweep(
        vec![working_cache("192.0.2.1")],
        HttpProbeOutcome::NotRun,
        "2026-07-31 00:01:00".to_string(),
    );
    assert!(
        !engine.skip_http(),
        "a successful non-dark sweep clears skip_http"
    );
}

#[test]
fn insecure_accept_while_dark_writes_every_cache_candidate_to_resolvconf() {
    let tmp = std::env::temp_dir().join("dnstrigd_scenario_insecure_resolvconf.conf");
    std::fs::remove_file(&tmp).ok();
    let engine = make_engine(tmp.to_str().unwrap());

    engine.complete_sweep(
        vec![failing_cache("192.0.2.1")],
        HttpProbeOutcome::CaptivePortal,
        "2026-07-31 00:00:00".to_string(),
    );

    engine.set_insecure(true);

    let content = std::fs::read_to_string(&tmp).unwrap();
    assert!(
        content.contains("nameserver 192.0.2.1\n"),
        "a non-working cache candidate must still be written once the user accepts \
         insecure mode while dark, or there is nothing left to resolve through"
    );
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn broadcast_carries_successive_sweep_snapshots_in_order() {
    let engine = make_engine("/tmp/dnstrigd_scenario_broadcast.conf");
    let mut rx = engine.subscribe();

    engine.complete_sweep(
        vec![failing_cache("192.0.2.1")],
        HttpProbeOutcome::CaptivePortal,
        "2026-07-31 00:00:00".to_string(),
    );
    engine.complete_sweep(
        vec![working_cache("192.0.2.1")],
        HttpProbeOutcome::NotRun,
        "2026-07-31 00:01:00".to_string(),
    );

    let first = rx.try_recv().unwrap();
    let second = rx.try_recv().unwrap();
    assert!(first.contains("state: dark"));
    assert!(second.contains("state: cache"));
}
