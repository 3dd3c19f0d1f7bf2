use std::{sync::Arc, time::Duration};

use crate::{Limiter, Options, token_bucket};

fn limiter(capacity: i64, refill_rate: i64) -> Arc<dyn Limiter> {
    token_bucket(capacity, refill_rate, Options::default()).unwrap()
}

#[tokio::test]
async fn burst_drains_the_bucket_then_denies() {
    let limiter = limiter(5, 2);

    let mut outcomes = Vec::new();
    let mut first_denial_retry = None;
    for _ in 0..8 {
        let d = limiter.allow("b").await.unwrap();
        if !d.allowed && first_denial_retry.is_none() {
            first_denial_retry = Some(d.retry_after);
        }
        outcomes.push(d.allowed);
    }

    assert_eq!(
        outcomes,
        [true, true, true, true, true, false, false, false]
    );
    // One token short, refilling two per second: wait ceil(1 / 2) = 1s.
    assert_eq!(first_denial_retry, Some(Duration::from_secs(1)));
}

#[tokio::test]
async fn remaining_is_the_floor_of_the_token_count() {
    let limiter = limiter(5, 1);

    for expected_remaining in [4, 3, 2, 1, 0] {
        let d = limiter.allow("b").await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, expected_remaining);
    }
}

#[tokio::test]
async fn refills_at_the_configured_rate() {
    let limiter = limiter(2, 2);

    limiter.allow_n("b", 2).await.unwrap();
    assert!(!limiter.allow("b").await.unwrap().allowed);

    // 600ms at 2 tokens/s refills a bit more than one token.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(limiter.allow("b").await.unwrap().allowed);
    assert!(!limiter.allow("b").await.unwrap().allowed);
}

#[tokio::test]
async fn reset_refills_the_bucket() {
    let limiter = limiter(3, 1);

    limiter.allow_n("b", 3).await.unwrap();
    assert!(!limiter.allow("b").await.unwrap().allowed);

    limiter.reset("b").await.unwrap();
    limiter.reset("b").await.unwrap();

    let d = limiter.allow_n("b", 3).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_admit_exactly_the_capacity() {
    let limiter = limiter(5, 1);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(
            async move { limiter.allow("k").await.unwrap() },
        ));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().allowed {
            allowed += 1;
        }
    }

    assert_eq!(allowed, 5);
}

#[tokio::test]
async fn oversized_cost_denies_and_leaves_tokens_intact() {
    let limiter = limiter(3, 1);

    let d = limiter.allow_n("b", 4).await.unwrap();
    assert!(!d.allowed);
    assert_eq!(d.retry_after, Duration::from_secs(1));

    assert!(limiter.allow_n("b", 3).await.unwrap().allowed);
}
