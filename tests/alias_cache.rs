//! Request-scoped alias cache: memo layers, preload sets, storage call counts.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Duration;
use serde_json::json;

use common::{alias_cache, lang, CountingStore};
use ctxalias::{
    AliasStore, CacheBackend, InMemoryCacheBackend, MapKey, SaveRequest, ValidationError,
};

const CACHE_KEY: &str = "preload-paths:key";

struct Fixture {
    store: Arc<CountingStore>,
    backend: Arc<InMemoryCacheBackend>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(CountingStore::new()),
            backend: Arc::new(InMemoryCacheBackend::new()),
        }
    }

    fn alias(&self, source: &str, alias: &str, langcode: &str, contexts_path: Option<&str>) {
        let mut request = SaveRequest::new(source, alias).unwrap().langcode(lang(langcode));
        if let Some(path) = contexts_path {
            request = request.contexts_path(path);
        }
        self.store.save(request).unwrap();
    }

    fn preload(&self, langcode: &str, contexts_path: Option<&str>, paths: &[&str]) {
        let key = MapKey::new(&lang(langcode), contexts_path);
        self.backend
            .set(CACHE_KEY, json!({ key.as_str(): paths }), Duration::hours(1))
            .unwrap();
    }

    fn cached(&self) -> Option<serde_json::Value> {
        self.backend.get(CACHE_KEY).unwrap().map(|item| item.data)
    }

    fn path_alias_calls(&self) -> usize {
        self.store.path_alias.load(Ordering::SeqCst)
    }

    fn path_source_calls(&self) -> usize {
        self.store.path_source.load(Ordering::SeqCst)
    }

    fn preload_calls(&self) -> usize {
        self.store.preload.load(Ordering::SeqCst)
    }
}

#[test]
fn test_get_path_by_alias_no_match() {
    let f = Fixture::new();
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));

    assert_eq!(cache.get_path_by_alias("/missing", None, None), "/missing");
    assert_eq!(cache.get_path_by_alias("/missing", None, None), "/missing");
    assert_eq!(f.path_source_calls(), 1);
}

#[test]
fn test_get_path_by_alias_match() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));

    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(f.path_source_calls(), 1);
}

#[test]
fn test_get_path_by_alias_langcode_and_contexts() {
    let f = Fixture::new();
    f.alias("/node/1", "/ueber", "de", Some("store-a"));
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    let de = lang("de");

    assert_eq!(cache.get_path_by_alias("/ueber", Some(&de), Some("store-a")), "/node/1");
    assert_eq!(cache.get_path_by_alias("/ueber", Some(&de), Some("store-a")), "/node/1");
    assert_eq!(f.path_source_calls(), 1);

    // Other partitions do not see the scoped alias.
    assert_eq!(cache.get_path_by_alias("/ueber", Some(&de), None), "/node/1");
    assert_eq!(cache.get_path_by_alias("/ueber", None, Some("store-a")), "/ueber");
    assert_eq!(f.path_source_calls(), 3);
}

#[test]
fn test_empty_alias_passes_through() {
    let f = Fixture::new();
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    assert_eq!(cache.get_path_by_alias("", None, None), "");
    assert_eq!(f.store.lookups(), 0);
}

#[test]
fn test_get_alias_by_path_requires_leading_slash() {
    let f = Fixture::new();
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    assert!(matches!(
        cache.get_alias_by_path("no-leading-slash", None, None),
        Err(ValidationError::MissingLeadingSlash { field: "path", .. })
    ));
}

#[test]
fn test_get_alias_by_path_skips_root_and_unknown_segments() {
    let f = Fixture::new();
    f.alias("/taxonomy/term/1", "/tags", "en", None);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));

    assert_eq!(cache.get_alias_by_path("/", None, None).unwrap(), "/");
    assert_eq!(
        cache.get_alias_by_path("/taxonomy/term/1", None, None).unwrap(),
        "/taxonomy/term/1"
    );
    assert_eq!(f.store.lookups(), 0);
}

#[test]
fn test_get_alias_by_path_no_match_writes_preload_set() {
    let f = Fixture::new();
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(cache.get_alias_by_path("/node/7", None, None).unwrap(), "/node/7");
    assert_eq!(cache.get_alias_by_path("/node/7", None, None).unwrap(), "/node/7");
    assert_eq!(f.path_alias_calls(), 1);
    assert!(cache.cache_needs_writing());

    assert!(cache.write_cache());
    let key = MapKey::new(&lang("en"), None);
    assert_eq!(f.cached(), Some(json!({ key.as_str(): ["/node/7"] })));
}

#[test]
fn test_get_alias_by_path_match_with_contexts_writes_preload_set() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", Some("store-a/warehouse-3"));
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    let scope = Some("store-a/warehouse-3");
    assert_eq!(cache.get_alias_by_path("/node/1", None, scope).unwrap(), "/about");
    assert_eq!(cache.get_alias_by_path("/node/1", None, scope).unwrap(), "/about");
    assert_eq!(f.path_alias_calls(), 1);

    assert!(cache.write_cache());
    let key = MapKey::new(&lang("en"), scope);
    assert_eq!(f.cached(), Some(json!({ key.as_str(): ["/node/1"] })));

    // A second write in the same request is a no-op.
    assert!(!cache.write_cache());
}

#[test]
fn test_cached_match_uses_one_preload() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    f.preload("en", None, &["/node/1"]);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(f.preload_calls(), 1);
    assert_eq!(f.path_alias_calls(), 0);
    assert!(!cache.write_cache());
}

#[test]
fn test_cached_match_with_contexts() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", Some("store-a"));
    f.preload("en", Some("store-a"), &["/node/1"]);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(
        cache.get_alias_by_path("/node/1", None, Some("store-a")).unwrap(),
        "/about"
    );
    assert_eq!(
        cache.get_alias_by_path("/node/1", None, Some("store-a")).unwrap(),
        "/about"
    );
    assert_eq!(f.preload_calls(), 1);
    assert_eq!(f.path_alias_calls(), 0);
    assert!(!cache.write_cache());
}

#[test]
fn test_cached_miss_for_other_language() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    f.preload("de", None, &["/node/1"]);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(f.preload_calls(), 0);
    assert_eq!(f.path_alias_calls(), 1);
    assert!(!cache.write_cache());
}

#[test]
fn test_cached_miss_without_alias() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    f.preload("en", None, &["/node/1", "/node/2"]);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(cache.get_alias_by_path("/node/2", None, None).unwrap(), "/node/2");
    assert_eq!(cache.get_alias_by_path("/node/2", None, None).unwrap(), "/node/2");
    assert_eq!(f.preload_calls(), 1);
    assert_eq!(f.path_alias_calls(), 0);
    assert!(!cache.write_cache());
}

#[test]
fn test_uncached_miss_without_alias() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    f.preload("en", None, &["/node/1"]);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(cache.get_alias_by_path("/node/2", None, None).unwrap(), "/node/2");
    assert_eq!(cache.get_alias_by_path("/node/2", None, None).unwrap(), "/node/2");
    assert_eq!(f.preload_calls(), 1);
    assert_eq!(f.path_alias_calls(), 1);
    assert!(!cache.write_cache());
}

#[test]
fn test_uncached_miss_with_alias_and_contexts() {
    let f = Fixture::new();
    let scope = Some("store-a");
    f.alias("/node/1", "/about", "en", scope);
    f.alias("/node/3", "/contact", "en", scope);
    f.preload("en", scope, &["/node/1", "/node/2"]);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(cache.get_alias_by_path("/node/3", None, scope).unwrap(), "/contact");
    assert_eq!(cache.get_alias_by_path("/node/3", None, scope).unwrap(), "/contact");
    assert_eq!(cache.get_alias_by_path("/node/1", None, scope).unwrap(), "/about");
    assert_eq!(f.preload_calls(), 1);
    assert_eq!(f.path_alias_calls(), 1);
    assert!(!cache.write_cache());
}

#[test]
fn test_positive_memo_serves_reverse_lookup() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));

    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(f.path_source_calls(), 0);
}

#[test]
fn test_reverse_memo_keeps_every_resolved_alias() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    f.alias("/node/1", "/about-us", "en", None);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));

    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about-us");
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(f.path_source_calls(), 1);

    // The older alias now fills the forward memo; the newer one still
    // resolves from memory.
    assert_eq!(cache.get_path_by_alias("/about-us", None, None), "/node/1");
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(f.path_source_calls(), 1);

    cache.cache_clear(Some("/about-us"));
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(f.path_source_calls(), 1);
    assert_eq!(cache.get_path_by_alias("/about-us", None, None), "/node/1");
    assert_eq!(f.path_source_calls(), 2);

    cache.cache_clear(None);
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(f.path_source_calls(), 3);
}

#[test]
fn test_cache_clear() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    f.preload("en", None, &["/node/9"]);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(f.path_alias_calls(), 1);
    assert_eq!(f.path_source_calls(), 0);

    cache.cache_clear(Some("/node/1"));
    assert_eq!(f.cached(), None);

    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(f.path_alias_calls(), 2);

    // Clearing an unknown path keeps the positive memo.
    cache.cache_clear(Some("/non-existent"));
    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(f.path_alias_calls(), 2);
}

#[test]
fn test_cache_clear_keeps_unrelated_memos() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    f.alias("/node/2", "/contact", "en", None);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));

    cache.get_alias_by_path("/node/1", None, None).unwrap();
    cache.get_alias_by_path("/node/2", None, None).unwrap();
    cache.cache_clear(Some("/about"));

    assert_eq!(cache.get_alias_by_path("/node/2", None, None).unwrap(), "/contact");
    assert_eq!(f.path_alias_calls(), 2);
    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(f.path_alias_calls(), 3);

    cache.cache_clear(None);
    cache.get_alias_by_path("/node/2", None, None).unwrap();
    assert_eq!(f.path_alias_calls(), 4);
}

#[test]
fn test_storage_errors_are_not_memoized() {
    let f = Fixture::new();
    f.alias("/node/1", "/about", "en", None);
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));

    f.store.fail(true);
    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/node/1");
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/about");

    f.store.fail(false);
    assert_eq!(cache.get_alias_by_path("/node/1", None, None).unwrap(), "/about");
    assert_eq!(cache.get_path_by_alias("/about", None, None), "/node/1");
    assert_eq!(f.path_alias_calls(), 2);
}

#[test]
fn test_malformed_preload_entry_is_rewritten() {
    let f = Fixture::new();
    f.backend
        .set(CACHE_KEY, json!("not a map"), Duration::hours(1))
        .unwrap();
    let mut cache = alias_cache(&f.store, &f.backend, lang("en"));
    cache.set_cache_key("key");

    assert_eq!(cache.get_alias_by_path("/node/4", None, None).unwrap(), "/node/4");
    assert!(cache.cache_needs_writing());
    assert!(cache.write_cache());
    let key = MapKey::new(&lang("en"), None);
    assert_eq!(f.cached(), Some(json!({ key.as_str(): ["/node/4"] })));
}
