//! Property tests for backoff arithmetic and config synthesis

use omniboot::capability::{names, Capability, CapabilitySet, HostFacts, Presence};
use omniboot::config::{Defaults, Overrides, Synthesizer};
use omniboot::sequencer::Backoff;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use std::time::Duration;

#[quickcheck]
fn backoff_total_is_geometric_sum(base_ms: u16, attempts: u8) -> TestResult {
    let attempts = u32::from(attempts % 16);
    if attempts == 0 {
        return TestResult::discard();
    }
    let base = Duration::from_millis(u64::from(base_ms));
    let backoff = Backoff::new(base, attempts);

    // base * (2^0 + ... + 2^(N-2)) = base * (2^(N-1) - 1)
    let expected = base * ((1u32 << (attempts - 1)) - 1);
    TestResult::from_bool(
        backoff.total_wait() == expected && backoff.waits().len() as u32 == attempts - 1,
    )
}

#[quickcheck]
fn backoff_delays_double(base_ms: u16, attempt: u8) -> bool {
    let attempt = u32::from(attempt % 20) + 1;
    let backoff = Backoff::new(Duration::from_millis(u64::from(base_ms)), 32);
    backoff.delay(attempt + 1) == backoff.delay(attempt) * 2
}

#[quickcheck]
fn backoff_never_exceeds_budget(attempts: u8) -> bool {
    let attempts = u32::from(attempts % 12) + 1;
    let backoff = Backoff::new(Duration::from_millis(10), attempts);
    !backoff.has_next(attempts) && (1..attempts).all(|k| backoff.has_next(k))
}

#[quickcheck]
fn synthesis_is_deterministic(
    ports: Vec<u16>,
    has_daemon: bool,
    has_gpu: bool,
    port_override: Option<u16>,
    attempts_override: Option<String>,
) -> bool {
    let presence = |present: bool| {
        if present {
            Presence::present()
        } else {
            Presence::Absent
        }
    };
    let caps = CapabilitySet::default()
        .with(Capability::new(names::INFERENCE_DAEMON, presence(has_daemon)))
        .with(Capability::new(names::GPU, presence(has_gpu)))
        .with_facts(HostFacts {
            free_ports: ports.into_iter().filter(|p| *p != 0).collect(),
            ..HostFacts::default()
        });

    let mut overrides = Overrides::default();
    if let Some(port) = port_override {
        overrides = overrides.with("port", &port.to_string());
    }
    if let Some(raw) = &attempts_override {
        overrides = overrides.with("app_max_attempts", raw);
    }

    let synthesizer = Synthesizer::new("/srv/app", Defaults::default());
    let first = synthesizer.synthesize(&caps, &overrides);
    let second = synthesizer.synthesize(&caps, &overrides);

    match (first.to_pretty_json(), second.to_pretty_json()) {
        (Ok(a), Ok(b)) => a == b && first.server.port != 0 && first.services.app.max_attempts > 0,
        _ => false,
    }
}
