use crate::Options;

#[test]
fn plain_keys_join_prefix_and_key() {
    let options = Options::default();
    assert_eq!(options.format_key("user_1"), "ratelimit:user_1");
    assert_eq!(options.format_key_suffix("user_1", 7), "ratelimit:user_1:7");
}

#[test]
fn hash_tag_wraps_the_user_key_in_braces() {
    let options = Options::default().with_hash_tag(true);
    assert_eq!(options.format_key("user_1"), "ratelimit:{user_1}");
    assert_eq!(
        options.format_key_suffix("user_1", 7),
        "ratelimit:{user_1}:7"
    );
}

#[test]
fn custom_prefix_applies_to_every_key() {
    let options = Options::default().with_key_prefix("api").with_hash_tag(true);
    assert_eq!(options.format_key("k"), "api:{k}");
    assert_eq!(options.format_key_suffix("k", "x"), "api:{k}:x");
}

#[test]
fn resolve_limit_prefers_positive_resolver_answers() {
    let options = Options::default().with_limit_fn(|key| if key == "a" { 7 } else { 0 });
    assert_eq!(options.resolve_limit("a", 10), 7);
    assert_eq!(options.resolve_limit("b", 10), 10);

    let options = Options::default();
    assert_eq!(options.resolve_limit("a", 10), 10);
}

#[test]
fn defaults_match_the_documented_values() {
    let options = Options::default();
    assert_eq!(options.key_prefix, "ratelimit");
    assert!(options.fail_open);
    assert!(!options.hash_tag);
    assert!(options.store.is_none());
    assert!(options.limit_fn.is_none());
}
