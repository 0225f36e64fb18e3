use {crate::utils::ratelimit::RateLimit, std::time::Duration};

#[test]
fn burst_then_suppress() {
    let rl = RateLimit::new(Duration::from_secs(3600), 2);
    assert_eq!(rl.check(), Some(0));
    assert_eq!(rl.check(), Some(0));
    assert_eq!(rl.check(), None);
    assert_eq!(rl.check(), None);
}

#[test]
fn zero_interval_never_suppresses() {
    let rl = RateLimit::new(Duration::ZERO, 1);
    assert_eq!(rl.check(), Some(0));
    assert_eq!(rl.check(), Some(0));
}
