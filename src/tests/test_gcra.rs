use std::{sync::Arc, time::Duration};

use crate::{Limiter, Options, gcra};

fn limiter(rate: i64, burst: i64) -> Arc<dyn Limiter> {
    gcra(rate, burst, Options::default()).unwrap()
}

#[tokio::test]
async fn burst_admits_then_denies_with_a_wait() {
    let limiter = limiter(10, 2);

    assert!(limiter.allow("d").await.unwrap().allowed);
    assert!(limiter.allow("d").await.unwrap().allowed);

    let d = limiter.allow("d").await.unwrap();
    assert!(!d.allowed);
    assert!(d.retry_after >= Duration::from_millis(100));
    assert!(d.retry_after <= Duration::from_secs(1));

    tokio::time::sleep(d.retry_after + Duration::from_millis(50)).await;
    assert!(limiter.allow("d").await.unwrap().allowed);
}

#[tokio::test]
async fn steady_rate_at_the_emission_interval_is_sustained() {
    let limiter = limiter(20, 1);

    for _ in 0..5 {
        assert!(limiter.allow("d").await.unwrap().allowed);
        tokio::time::sleep(Duration::from_millis(55)).await;
    }
}

#[tokio::test]
async fn remaining_counts_burst_headroom() {
    let limiter = limiter(1, 3);

    let d = limiter.allow("d").await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.limit, 3);
    assert_eq!(d.remaining, 2);

    let d = limiter.allow("d").await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 1);
}

#[tokio::test]
async fn reset_forgets_the_arrival_time() {
    let limiter = limiter(10, 2);

    limiter.allow("d").await.unwrap();
    limiter.allow("d").await.unwrap();
    assert!(!limiter.allow("d").await.unwrap().allowed);

    limiter.reset("d").await.unwrap();
    limiter.reset("d").await.unwrap();

    let d = limiter.allow_n("d", 2).await.unwrap();
    assert!(d.allowed);
}

#[tokio::test]
async fn cost_beyond_the_burst_is_denied() {
    let limiter = limiter(10, 2);

    assert!(!limiter.allow_n("d", 3).await.unwrap().allowed);
    assert!(limiter.allow_n("d", 2).await.unwrap().allowed);
}
