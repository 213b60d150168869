use super::*;

fn config(base_ms: u64, max_ms: u64, factor: f64, jitter: f64) -> BackoffConfig {
    BackoffConfig {
        base: Duration::from_millis(base_ms),
        max: Duration::from_millis(max_ms),
        factor,
        jitter,
    }
}

#[test]
fn grows_geometrically_then_caps() {
    let mut backoff = Backoff::new(config(100, 1_000, 2.0, 0.0));
    let mut seen = vec![backoff.current()];
    for _ in 0..5 {
        backoff.grow();
        seen.push(backoff.current());
    }
    let ms: Vec<u128> = seen.iter().map(Duration::as_millis).collect();
    assert_eq!(ms, vec![100, 200, 400, 800, 1_000, 1_000]);
}

#[test]
fn reset_returns_to_base() {
    let mut backoff = Backoff::new(config(100, 1_000, 3.0, 0.0));
    backoff.grow();
    backoff.grow();
    backoff.reset();
    assert_eq!(backoff.current(), Duration::from_millis(100));
}

#[test]
fn next_delay_without_jitter_is_current() {
    let mut backoff = Backoff::new(config(100, 1_000, 2.0, 0.0));
    assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    backoff.grow();
    assert_eq!(backoff.next_delay(), Duration::from_millis(200));
}

#[test]
fn jitter_stays_within_ratio() {
    let backoff = Backoff::new(config(1_000, 30_000, 2.0, 0.2));
    for _ in 0..200 {
        let delay = backoff.next_delay().as_millis();
        assert!((800..=1_200).contains(&delay), "delay {delay}ms out of range");
    }
}

#[test]
fn jittered_extremes() {
    let base = Duration::from_millis(1_000);
    assert_eq!(jittered(base, 0.2, -1.0), Duration::from_millis(800));
    assert_eq!(jittered(base, 0.2, 1.0), Duration::from_millis(1_200));
    assert_eq!(jittered(base, 0.2, 0.0), base);
    // Out-of-range samples are clamped.
    assert_eq!(jittered(base, 0.2, 5.0), Duration::from_millis(1_200));
}

#[test]
fn jittered_never_drops_below_floor() {
    assert_eq!(jittered(Duration::from_millis(40), 1.0, -1.0), MIN_RECONNECT_DELAY);
    assert_eq!(jittered(Duration::ZERO, 0.0, 0.0), MIN_RECONNECT_DELAY);
}
