use std::time::Duration;

use crate::{
    FlowgateError,
    store::{KeyTtl, MemoryStore, Store},
};

#[tokio::test]
async fn get_missing_key_reports_key_not_found() {
    let store = MemoryStore::new();
    let err = store.get("missing").await.unwrap_err();
    assert!(matches!(err, FlowgateError::KeyNotFound(key) if key == "missing"));
}

#[tokio::test]
async fn set_then_get_round_trips() {
    let store = MemoryStore::new();
    store.set("k", "v", Duration::ZERO).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), "v");
}

#[tokio::test]
async fn values_expire_after_their_ttl() {
    let store = MemoryStore::new();
    store.set("k", "v", Duration::from_millis(40)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), "v");

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(store.get("k").await.is_err());
}

#[tokio::test]
async fn incr_by_initializes_and_accumulates() {
    let store = MemoryStore::new();
    assert_eq!(store.incr_by("n", 3).await.unwrap(), 3);
    assert_eq!(store.incr_by("n", 2).await.unwrap(), 5);
}

#[tokio::test]
async fn ttl_sentinels_cover_all_three_cases() {
    let store = MemoryStore::new();

    assert_eq!(store.ttl("absent").await.unwrap(), KeyTtl::Missing);

    store.set("forever", "v", Duration::ZERO).await.unwrap();
    assert_eq!(store.ttl("forever").await.unwrap(), KeyTtl::Persistent);

    store.set("bounded", "v", Duration::from_secs(30)).await.unwrap();
    match store.ttl("bounded").await.unwrap() {
        KeyTtl::Remaining(left) => assert!(left <= Duration::from_secs(30)),
        other => panic!("expected a remaining ttl, got {other:?}"),
    }
}

#[tokio::test]
async fn expire_zero_evicts_immediately() {
    let store = MemoryStore::new();
    store.set("k", "v", Duration::ZERO).await.unwrap();

    store.expire("k", Duration::ZERO).await.unwrap();
    assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
    assert!(store.get("k").await.is_err());
}

#[tokio::test]
async fn expire_applies_to_hashes_and_sorted_sets_too() {
    let store = MemoryStore::new();

    store.hash_set("h", &[("f", "1")]).await.unwrap();
    store.zadd("z", 1.0, "m").await.unwrap();

    store.expire("h", Duration::from_millis(40)).await.unwrap();
    store.expire("z", Duration::from_millis(40)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(store.hash_get_all("h").await.unwrap().is_empty());
    assert_eq!(store.zcard("z").await.unwrap(), 0);
}

#[tokio::test]
async fn hash_set_merges_fields() {
    let store = MemoryStore::new();
    store.hash_set("h", &[("a", "1"), ("b", "2")]).await.unwrap();
    store.hash_set("h", &[("b", "3")]).await.unwrap();

    let fields = store.hash_get_all("h").await.unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields["a"], "1");
    assert_eq!(fields["b"], "3");
}

#[tokio::test]
async fn zadd_replaces_an_existing_member() {
    let store = MemoryStore::new();
    store.zadd("z", 1.0, "m").await.unwrap();
    store.zadd("z", 9.0, "m").await.unwrap();

    assert_eq!(store.zcard("z").await.unwrap(), 1);
    let entries = store.zrange_with_scores("z", 0, -1).await.unwrap();
    assert_eq!(entries[0].score, 9.0);
}

#[tokio::test]
async fn zrem_range_by_score_drops_the_inclusive_range() {
    let store = MemoryStore::new();
    for (score, member) in [(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")] {
        store.zadd("z", score, member).await.unwrap();
    }

    store.zrem_range_by_score("z", 2.0, 3.0).await.unwrap();

    let entries = store.zrange_with_scores("z", 0, -1).await.unwrap();
    let members: Vec<&str> = entries.iter().map(|e| e.member.as_str()).collect();
    assert_eq!(members, ["a", "d"]);
}

#[tokio::test]
async fn zrange_clamps_negative_and_out_of_range_indices() {
    let store = MemoryStore::new();
    for (score, member) in [(1.0, "a"), (2.0, "b"), (3.0, "c")] {
        store.zadd("z", score, member).await.unwrap();
    }

    let oldest = store.zrange_with_scores("z", 0, 0).await.unwrap();
    assert_eq!(oldest[0].member, "a");

    let tail = store.zrange_with_scores("z", -2, -1).await.unwrap();
    let members: Vec<&str> = tail.iter().map(|e| e.member.as_str()).collect();
    assert_eq!(members, ["b", "c"]);

    let all = store.zrange_with_scores("z", 0, 99).await.unwrap();
    assert_eq!(all.len(), 3);

    assert!(store.zrange_with_scores("z", 2, 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn pipeline_applies_buffered_commands_on_exec() {
    let store = MemoryStore::new();

    let mut pipe = store.pipeline();
    pipe.zadd("z", 1.0, "a");
    pipe.zadd("z", 2.0, "b");
    pipe.expire("z", Duration::from_secs(30));
    pipe.exec().await.unwrap();

    assert_eq!(store.zcard("z").await.unwrap(), 2);
    assert!(matches!(
        store.ttl("z").await.unwrap(),
        KeyTtl::Remaining(_)
    ));
}

#[tokio::test]
async fn scripting_is_not_supported() {
    let store = MemoryStore::new();

    assert!(matches!(
        store.eval("return 1", &[], &[]).await.unwrap_err(),
        FlowgateError::ScriptUnsupported
    ));
    assert!(matches!(
        store.eval_sha("abc", &[], &[]).await.unwrap_err(),
        FlowgateError::ScriptUnsupported
    ));
    assert!(matches!(
        store.script_load("return 1").await.unwrap_err(),
        FlowgateError::ScriptUnsupported
    ));
}

#[tokio::test]
async fn del_spans_every_namespace() {
    let store = MemoryStore::new();
    store.set("k", "v", Duration::ZERO).await.unwrap();
    store.hash_set("k", &[("f", "1")]).await.unwrap();
    store.zadd("k", 1.0, "m").await.unwrap();

    store.del(&["k".to_string()]).await.unwrap();

    assert!(store.get("k").await.is_err());
    assert!(store.hash_get_all("k").await.unwrap().is_empty());
    assert_eq!(store.zcard("k").await.unwrap(), 0);
}

#[tokio::test]
async fn close_is_idempotent() {
    let store = MemoryStore::new();
    store.close().await.unwrap();
    store.close().await.unwrap();

    // The store keeps serving after close; only the sweeper stops.
    store.set("k", "v", Duration::ZERO).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), "v");
}
