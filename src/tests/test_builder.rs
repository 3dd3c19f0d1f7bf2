use std::{sync::Arc, time::Duration};

use crate::{Builder, FlowgateError, LeakyBucketMode, store::MemoryStore};

#[tokio::test]
async fn builds_each_algorithm() {
    let window = Duration::from_secs(60);

    for limiter in [
        Builder::new().fixed_window(10, window).build().unwrap(),
        Builder::new().sliding_window(10, window).build().unwrap(),
        Builder::new()
            .sliding_window_counter(10, window)
            .build()
            .unwrap(),
        Builder::new().token_bucket(10, 5).build().unwrap(),
        Builder::new()
            .leaky_bucket(10, 5, LeakyBucketMode::Policing)
            .build()
            .unwrap(),
        Builder::new().gcra(10, 5).build().unwrap(),
    ] {
        let d = limiter.allow("k").await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.limit, 10);
    }
}

#[test]
fn build_without_an_algorithm_fails() {
    let err = Builder::new().build().unwrap_err();
    assert!(matches!(err, FlowgateError::InvalidParameter(_)));
    assert!(err.to_string().contains("no algorithm selected"));
}

#[test]
fn non_positive_parameters_fail_construction() {
    let window = Duration::from_secs(60);

    let cases = [
        Builder::new().fixed_window(0, window).build(),
        Builder::new().fixed_window(10, Duration::ZERO).build(),
        Builder::new().sliding_window(-1, window).build(),
        Builder::new().token_bucket(0, 5).build(),
        Builder::new().token_bucket(5, 0).build(),
        Builder::new()
            .leaky_bucket(5, -2, LeakyBucketMode::Shaping)
            .build(),
        Builder::new().gcra(-1, 5).build(),
        Builder::new().gcra(5, 0).build(),
    ];

    for case in cases {
        assert!(matches!(
            case.unwrap_err(),
            FlowgateError::InvalidParameter(_)
        ));
    }
}

#[tokio::test]
async fn a_store_selects_the_distributed_variant() {
    // MemoryStore has no scripting, so the first decision through the
    // distributed engine must surface ScriptUnsupported, fail-open or not.
    let limiter = Builder::new()
        .fixed_window(10, Duration::from_secs(60))
        .store(Arc::new(MemoryStore::new()))
        .fail_open(true)
        .build()
        .unwrap();

    let err = limiter.allow("k").await.unwrap_err();
    assert!(matches!(err, FlowgateError::ScriptUnsupported));
}

#[tokio::test]
async fn builder_options_reach_the_engine() {
    let limiter = Builder::new()
        .fixed_window(10, Duration::from_secs(60))
        .limit_fn(|key| if key == "vip" { 500 } else { 0 })
        .build()
        .unwrap();

    assert_eq!(limiter.allow("vip").await.unwrap().limit, 500);
    assert_eq!(limiter.allow("other").await.unwrap().limit, 10);
}
