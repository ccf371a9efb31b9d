use kasane::{
    Composer, ComposerOptions, Context, EntryKind, Scope, Value, from_fn, json,
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

mod common;
use common::{CountingStep, sorted_keys};

fn counted_plugin(name: &str, seed: Option<Value>, calls: Arc<AtomicUsize>) -> Composer {
    let mut options = ComposerOptions::new().with_name(name);
    if let Some(seed) = seed {
        options = options.with_seed(seed);
    }
    Composer::with_options(options).step(CountingStep { calls })
}

/// A step that stores the context's keys, as seen at that point, in `seen`.
fn observe(seen: Arc<Mutex<Vec<String>>>) -> impl kasane::Middleware {
    from_fn(move |ctx, next| {
        *seen.lock().unwrap() = sorted_keys(&ctx);
        async move { next.run().await }
    })
}

#[tokio::test]
async fn test_dedup_by_name_and_seed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let first = counted_plugin("limiter", Some(json!({ "rate": 10 })), calls.clone());
    let same = counted_plugin("limiter", Some(json!({ "rate": 10 })), calls.clone());
    let other = counted_plugin("limiter", Some(json!({ "rate": 20 })), calls.clone());

    let mut app = Composer::new().extend(&first).extend(&same).extend(&other);
    assert_eq!(app.len(), 2);

    app.run(Context::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transitive_dedup() {
    let calls = Arc::new(AtomicUsize::new(0));
    let a = counted_plugin("a", None, calls.clone());
    let b = Composer::named("b").extend(&a);
    assert!(b.has_extended("anull"));

    let mut target = Composer::new().extend(&b).extend(&a);
    target.run(Context::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut reversed = Composer::new().extend(&a).extend(&b);
    calls.store(0, Ordering::SeqCst);
    reversed.run(Context::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scope_visibility() {
    let inner = Composer::named("inner")
        .decorate(json!({ "local": 1 }))
        .decorate_as(Scope::Scoped, json!({ "scoped": 1 }))
        .decorate_as(Scope::Global, json!({ "global": 1 }));

    let in_middle = Arc::new(Mutex::new(Vec::new()));
    let middle = Composer::named("middle")
        .extend(&inner)
        .step(observe(in_middle.clone()));

    let in_outer = Arc::new(Mutex::new(Vec::new()));
    let mut outer = Composer::new()
        .extend(&middle)
        .step(observe(in_outer.clone()));

    outer.run(Context::new()).await.unwrap();

    // Global entries leave the plugin and run after its isolated group.
    assert_eq!(*in_middle.lock().unwrap(), vec!["scoped"]);
    assert_eq!(*in_outer.lock().unwrap(), vec!["global"]);

    let mut standalone = middle.clone();
    standalone.run(Context::new()).await.unwrap();
    assert_eq!(*in_middle.lock().unwrap(), vec!["global", "scoped"]);
}

#[tokio::test]
async fn test_isolation_reverts_added_and_mutated_keys() {
    let plugin = Composer::named("mutator").step(from_fn(|ctx, next| async move {
        ctx.insert("k", "added");
        ctx.insert("j", "mutated");
        next.run().await
    }));

    let seen = Arc::new(Mutex::new(None));
    let capture = seen.clone();
    let mut app = Composer::new()
        .extend(&plugin)
        .step(from_fn(move |ctx, next| {
            *capture.lock().unwrap() = Some(ctx.to_value());
            async move { next.run().await }
        }));

    app.run(Context::from(json!({ "j": "original" }))).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(json!({ "j": "original" })));
}

#[tokio::test]
async fn test_local_auth_plugin_extended_twice() {
    let derives = Arc::new(AtomicUsize::new(0));
    let counter = derives.clone();
    let auth = Composer::named("auth").derive(move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(json!({ "user": ctx.get("token") })) }
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut app = Composer::new()
        .extend(&auth)
        .extend(&auth)
        .step(observe(seen.clone()));

    app.run(Context::from(json!({ "token": "t-1" }))).await.unwrap();

    assert_eq!(derives.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), vec!["token"]);
}

#[tokio::test]
async fn test_plugin_gate_does_not_stop_parent() {
    let (skipped, skipped_calls) = CountingStep::new();
    let plugin = Composer::named("gated")
        .guard(|ctx| ctx.contains("admin"))
        .step(skipped);

    let (after, after_calls) = CountingStep::new();
    let mut app = Composer::new().extend(&plugin).step(after);

    app.run(Context::new()).await.unwrap();

    assert_eq!(skipped_calls.load(Ordering::SeqCst), 0);
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_gate_in_own_composer_stops_chain() {
    let (after, after_calls) = CountingStep::new();
    let mut app = Composer::new().guard(|_ctx| false).step(after);

    app.run(Context::new()).await.unwrap();

    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plugin_error_handlers_are_inherited() {
    let plugin = Composer::named("recovering")
        .on_error(|event| async move { Ok(Some(json!({ "recovered": event.error.to_string() }))) });

    let mut app = Composer::new()
        .extend(&plugin)
        .step(from_fn(|_ctx, _next| async {
            Err::<(), kasane::BoxError>("boom".into())
        }));

    let result = app.run(Context::new()).await.unwrap();
    assert_eq!(result, Some(json!({ "recovered": "boom" })));
}

#[test]
fn test_inspect_after_extend() {
    let plugin = Composer::named("p")
        .step(CountingStep::new().0)
        .decorate_as(Scope::Global, json!({ "g": true }));

    let app = Composer::new().extend(&plugin);
    let info = app.inspect();

    assert_eq!(info.len(), 2);
    assert_eq!(info[0].kind, EntryKind::Extend);
    assert_eq!(info[0].plugin.as_deref(), Some("pnull"));
    assert_eq!(info[1].kind, EntryKind::Decorate);
    assert_eq!(info[1].scope, Scope::Global);
}

#[tokio::test]
async fn test_panicking_plugin_step_leaves_context_restored() {
    let plugin = Composer::named("volatile").step(from_fn(|ctx, next| async move {
        ctx.insert("leaked", true);
        if ctx.contains("leaked") {
            panic!("plugin exploded");
        }
        next.run().await
    }));

    let seen = Arc::new(Mutex::new(None));
    let capture = seen.clone();
    let mut app = Composer::new().extend(&plugin).on_error(move |event| {
        *capture.lock().unwrap() = Some((event.context.to_value(), event.error.to_string()));
        async { Ok(None) }
    });

    let ctx = Context::from(json!({ "request": 1 }));
    app.run(ctx.clone()).await.unwrap();

    assert_eq!(ctx.to_value(), json!({ "request": 1 }));
    assert_eq!(
        *seen.lock().unwrap(),
        Some((
            json!({ "request": 1 }),
            "middleware panicked: plugin exploded".to_string()
        ))
    );
}
