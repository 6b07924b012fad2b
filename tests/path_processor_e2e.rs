//! End-to-end request flow: negotiation, inbound resolution, outbound links.

mod common;

use std::sync::Arc;

use common::{ctx, lang, CountingStore};
use ctxalias::{
    AliasConditions, AliasEngine, AliasStore, CacheableMetadata, ContextsCacheContext,
    ContextsConfig, InMemoryCacheBackend, InMemoryContextSource, LangCode, OutboundOptions,
    SaveRequest, StoreWhitelist, ValidationError,
};

fn contexts() -> Arc<InMemoryContextSource> {
    Arc::new(InMemoryContextSource::with_contexts([
        ctx("store-a", 0),
        ctx("store-b", 0),
        ctx("warehouse-3", 1),
    ]))
}

fn config() -> ContextsConfig {
    let mut config = ContextsConfig::default();
    config
        .language_prefixes
        .insert("de".to_string(), "deutsch".to_string());
    config
}

fn engine() -> AliasEngine {
    AliasEngine::in_memory(contexts(), config()).unwrap()
}

fn counting_engine() -> (AliasEngine, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::new());
    let dyn_store: Arc<dyn AliasStore> = store.clone();
    let engine = AliasEngine::new(
        Arc::clone(&dyn_store),
        Arc::new(InMemoryCacheBackend::new()),
        Arc::new(StoreWhitelist::new(dyn_store)),
        contexts(),
        config(),
    );
    (engine, store)
}

fn und() -> LangCode {
    LangCode::not_specified()
}

#[test]
fn test_round_trip_in_language() {
    let engine = engine();
    let de = lang("de");
    engine
        .save(SaveRequest::new("/a", "/b").unwrap().langcode(de.clone()))
        .unwrap();

    let mut scope = engine.begin_request("/", de.clone());
    let cache = scope.alias_cache();
    assert_eq!(cache.get_alias_by_path("/a", Some(&de), None).unwrap(), "/b");
    assert_eq!(cache.get_path_by_alias("/b", Some(&de), None), "/a");
}

#[test]
fn test_inbound_with_language_prefix_and_contexts() {
    let engine = engine();
    engine
        .save(
            SaveRequest::new("/node/1", "/ueber-uns")
                .unwrap()
                .langcode(lang("de"))
                .contexts_path("store-a/warehouse-3"),
        )
        .unwrap();

    let mut scope = engine.begin_request("/deutsch/store-a/warehouse-3/ueber-uns", lang("de"));
    assert_eq!(scope.negotiator().contexts().ids(), vec!["store-a", "warehouse-3"]);
    assert_eq!(scope.process_inbound("/store-a/warehouse-3/ueber-uns"), "/node/1");
}

#[test]
fn test_inbound_unknown_alias_passes_through() {
    let engine = engine();
    let mut scope = engine.begin_request("/store-a/nowhere", und());
    assert_eq!(scope.process_inbound("/store-a/nowhere"), "/nowhere");
}

#[test]
fn test_outbound_uses_negotiated_stack() {
    let engine = engine();
    engine
        .save(
            SaveRequest::new("/node/1", "/about")
                .unwrap()
                .contexts_path("store-a/warehouse-3"),
        )
        .unwrap();

    let mut scope = engine.begin_request("/store-a/warehouse-3/node/2", und());
    let link = scope
        .process_outbound("/node/1", &OutboundOptions::new(), None)
        .unwrap();
    assert_eq!(link, "/store-a/warehouse-3/about");
}

#[test]
fn test_outbound_with_explicit_contexts() {
    let engine = engine();
    engine
        .save(
            SaveRequest::new("/node/1", "/about-b")
                .unwrap()
                .contexts_path("store-b"),
        )
        .unwrap();

    let mut scope = engine.begin_request("/store-a/node/2", und());
    let options = OutboundOptions::new().with_contexts(vec![ctx("store-b", 0)]);
    assert_eq!(
        scope.process_outbound("/node/1", &options, None).unwrap(),
        "/store-b/about-b"
    );

    // An empty override falls back to the negotiated stack.
    let options = OutboundOptions::new().with_contexts(Vec::new());
    assert_eq!(
        scope.process_outbound("/node/1", &options, None).unwrap(),
        "/store-a/node/1"
    );
}

#[test]
fn test_outbound_already_aliased_is_only_prefixed() {
    let (engine, store) = counting_engine();
    let mut scope = engine.begin_request("/store-a/x", und());
    let options = OutboundOptions::new().already_aliased();
    assert_eq!(
        scope.process_outbound("/node/1", &options, None).unwrap(),
        "/store-a/node/1"
    );
    assert_eq!(store.lookups(), 0);
}

#[test]
fn test_outbound_in_other_language() {
    let engine = engine();
    engine
        .save(SaveRequest::new("/node/1", "/about").unwrap().langcode(lang("en")))
        .unwrap();
    engine
        .save(SaveRequest::new("/node/1", "/ueber").unwrap().langcode(lang("de")))
        .unwrap();

    let mut scope = engine.begin_request("/node/1", lang("en"));
    assert_eq!(
        scope.process_outbound("/node/1", &OutboundOptions::new(), None).unwrap(),
        "/about"
    );
    let options = OutboundOptions::new().with_language(lang("de"));
    assert_eq!(scope.process_outbound("/node/1", &options, None).unwrap(), "/ueber");
}

#[test]
fn test_outbound_rejects_relative_path() {
    let engine = engine();
    let mut scope = engine.begin_request("/", und());
    assert!(matches!(
        scope.process_outbound("node/1", &OutboundOptions::new(), None),
        Err(ValidationError::MissingLeadingSlash { .. })
    ));
}

#[test]
fn test_outbound_marks_cache_metadata() {
    let engine = engine();
    let mut scope = engine.begin_request("/store-a", und());

    let mut metadata = CacheableMetadata::new();
    scope
        .process_outbound("/node/1", &OutboundOptions::new(), Some(&mut metadata))
        .unwrap();
    assert!(metadata.varies_on(ContextsCacheContext::CONTEXTS));

    let tags = scope.cache_context().cacheable_metadata();
    assert!(tags.cache_tags().contains("context:store-a"));
}

#[test]
fn test_cache_context_differs_per_contexts_path() {
    let engine = engine();
    let a = engine.begin_request("/store-a/x", und());
    let a_again = engine.begin_request("/store-a/y", und());
    let b = engine.begin_request("/store-b/x", und());
    let none = engine.begin_request("/x", und());

    assert_eq!(a.cache_context().context(), a_again.cache_context().context());
    assert_ne!(a.cache_context().context(), b.cache_context().context());
    assert_ne!(a.cache_context().context(), none.cache_context().context());
    assert_eq!(ContextsCacheContext::label(), "Contexts");
}

#[test]
fn test_preload_set_carries_to_next_request() {
    let (engine, store) = counting_engine();
    engine
        .save(SaveRequest::new("/node/1", "/about").unwrap())
        .unwrap();
    engine
        .save(SaveRequest::new("/node/2", "/contact").unwrap())
        .unwrap();

    let mut first = engine.begin_request("/about", und());
    assert_eq!(first.process_inbound("/about"), "/node/1");
    for path in ["/node/1", "/node/2", "/node/3"] {
        first.process_outbound(path, &OutboundOptions::new(), None).unwrap();
    }
    assert!(first.finish());
    let after_first = store.lookups();

    let mut second = engine.begin_request("/about", und());
    assert_eq!(second.process_inbound("/about"), "/node/1");
    let links: Vec<String> = ["/node/1", "/node/2", "/node/3"]
        .into_iter()
        .map(|path| {
            second
                .process_outbound(path, &OutboundOptions::new(), None)
                .unwrap()
        })
        .collect();
    assert_eq!(links, ["/about", "/contact", "/node/3"]);
    assert!(!second.finish());

    // One source lookup for the inbound alias, one preload for every link.
    assert_eq!(store.lookups() - after_first, 2);
}

#[test]
fn test_delete_hides_alias_from_new_requests() {
    let engine = engine();
    engine
        .save(SaveRequest::new("/user/1", "/me").unwrap())
        .unwrap();

    let mut scope = engine.begin_request("/", und());
    assert_eq!(
        scope.process_outbound("/user/1", &OutboundOptions::new(), None).unwrap(),
        "/me"
    );

    let deleted = engine
        .delete(&AliasConditions::new().with_alias("/me"))
        .unwrap();
    assert_eq!(deleted, 1);

    let mut scope = engine.begin_request("/", und());
    assert_eq!(
        scope.process_outbound("/user/1", &OutboundOptions::new(), None).unwrap(),
        "/user/1"
    );
}
