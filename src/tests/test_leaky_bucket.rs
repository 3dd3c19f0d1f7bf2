use std::{sync::Arc, time::Duration};

use crate::{LeakyBucketMode, Limiter, Options, leaky_bucket};

fn limiter(capacity: i64, leak_rate: i64, mode: LeakyBucketMode) -> Arc<dyn Limiter> {
    leaky_bucket(capacity, leak_rate, mode, Options::default()).unwrap()
}

#[tokio::test]
async fn policing_rejects_on_overflow() {
    let limiter = limiter(3, 1, LeakyBucketMode::Policing);

    for _ in 0..3 {
        let d = limiter.allow("e").await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.retry_after, Duration::ZERO);
    }

    let d = limiter.allow("e").await.unwrap();
    assert!(!d.allowed);
    assert_eq!(d.retry_after, Duration::from_secs(1));
}

#[tokio::test]
async fn policing_level_drains_over_time() {
    let limiter = limiter(2, 2, LeakyBucketMode::Policing);

    limiter.allow_n("e", 2).await.unwrap();
    assert!(!limiter.allow("e").await.unwrap().allowed);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(limiter.allow("e").await.unwrap().allowed);
}

#[tokio::test]
async fn shaping_queues_with_growing_delays() {
    let limiter = limiter(5, 5, LeakyBucketMode::Shaping);

    let tolerance = Duration::from_millis(50);
    for i in 0..5u32 {
        let d = limiter.allow("e").await.unwrap();
        assert!(d.allowed);

        // Each accepted unit pushes the next free slot out by 1/leak = 200ms.
        let expected = Duration::from_millis(200) * i;
        assert!(
            d.retry_after <= expected && d.retry_after + tolerance >= expected,
            "call {i}: expected delay near {expected:?}, got {:?}",
            d.retry_after
        );
    }

    // The queue is full; denials carry no retry hint in shaping mode.
    let d = limiter.allow("e").await.unwrap();
    assert!(!d.allowed);
    assert_eq!(d.retry_after, Duration::ZERO);
}

#[tokio::test]
async fn shaping_queue_drains_as_the_slots_pass() {
    let limiter = limiter(2, 2, LeakyBucketMode::Shaping);

    assert!(limiter.allow_n("e", 2).await.unwrap().allowed);
    assert!(!limiter.allow("e").await.unwrap().allowed);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(limiter.allow("e").await.unwrap().allowed);
}

#[tokio::test]
async fn reset_empties_the_bucket() {
    let limiter = limiter(2, 1, LeakyBucketMode::Policing);

    limiter.allow_n("e", 2).await.unwrap();
    assert!(!limiter.allow("e").await.unwrap().allowed);

    limiter.reset("e").await.unwrap();
    limiter.reset("e").await.unwrap();

    assert!(limiter.allow_n("e", 2).await.unwrap().allowed);
}
