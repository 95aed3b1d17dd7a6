//! Pipeline tests driven by native plugins.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use wrapcore::ArgDecl;
use wrapcore::ArgType;
use wrapcore::EnvMap;
use wrapcore::EnvRecord;
use wrapcore::InvokeError;
use wrapcore::InvokeStage;
use wrapcore::Limits;
use wrapcore::MethodDecl;
use wrapcore::MethodFamily;
use wrapcore::ResolutionError;
use wrapcore::Uri;
use wrapcore::WrapKind;
use wrapcore::WrapManifest;

use crate::client::Client;
use crate::client::ClientConfig;
use crate::client::ClientConfigBuilder;
use crate::client::InvokeOptions;
use crate::client::StepOutcome;
use crate::plugin;
use crate::plugin::MethodTable;
use crate::plugin::PluginError;
use crate::plugin::PluginPackage;
use crate::resolver::ExtendableResolver;

fn uri(raw: &str) -> Uri {
    Uri::parse(raw).unwrap()
}

fn map(value: Value) -> EnvMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn decl(family: MethodFamily, name: &str) -> MethodDecl {
    MethodDecl {
        family,
        name: name.into(),
        args: vec![],
        env_required: false,
    }
}

fn calc_manifest() -> WrapManifest {
    WrapManifest::new("calc", WrapKind::Plugin).with_method(MethodDecl {
        family: MethodFamily::Query,
        name: "double".into(),
        args: vec![ArgDecl {
            name: "x".into(),
            ty: ArgType::Integer,
            required: true,
        }],
        env_required: false,
    })
}

fn calc_table() -> MethodTable {
    MethodTable::new().query("double", |args, _ctx| async move {
        let x = args["x"].as_i64().unwrap_or_default();
        Ok(json!(x * 2))
    })
}

fn calc() -> PluginPackage {
    PluginPackage::from_table(calc_manifest(), calc_table())
}

/// Returns the environment the call saw, through both access paths.
fn env_reader(name: &str) -> PluginPackage {
    let manifest = WrapManifest::new(name, WrapKind::Plugin)
        .with_method(decl(MethodFamily::Query, "readEnv"))
        .with_method(decl(MethodFamily::Mutation, "readEnv"));
    let read = |_args: Value, ctx: plugin::PluginContext| async move {
        let ambient = plugin::current_env().map(|env| Value::Object((*env).clone()));
        let passed = ctx.env().cloned().map(Value::Object);
        assert_eq!(ambient, passed);
        Ok(passed.unwrap_or(Value::Null))
    };
    PluginPackage::from_table(manifest, MethodTable::new().query("readEnv", read).mutation("readEnv", read))
}

fn client(builder: ClientConfigBuilder) -> Client {
    Client::new(builder.build().unwrap()).unwrap()
}

#[tokio::test]
async fn test_plugin_double() {
    let client = client(ClientConfig::builder().plugin(uri("plugin/calc"), calc()));
    let out: i64 = client
        .invoke(&uri("wrap://plugin/calc"), "query.double", &json!({ "x": 21 }))
        .await
        .unwrap();
    assert_eq!(out, 42);
}

#[tokio::test]
async fn test_redirect_is_transparent() {
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), calc())
            .redirect(uri("ens/calc.eth"), uri("plugin/calc")),
    );

    let direct: i64 = client.invoke(&uri("plugin/calc"), "query.double", &json!({ "x": 4 })).await.unwrap();
    let redirected: i64 = client.invoke(&uri("ens/calc.eth"), "query.double", &json!({ "x": 4 })).await.unwrap();
    assert_eq!(direct, redirected);

    let resolution = client.try_resolve_uri(&uri("ens/calc.eth")).await.unwrap();
    assert_eq!(resolution.final_uri, uri("plugin/calc"));
    assert_eq!(resolution.redirects(), 1);
    assert_eq!(resolution.history[0].outcome, StepOutcome::Redirect(uri("plugin/calc")));
}

#[tokio::test]
async fn test_redirect_cycle_is_detected() {
    let client = client(
        ClientConfig::builder()
            .redirect(uri("ens/a.eth"), uri("ens/b.eth"))
            .redirect(uri("ens/b.eth"), uri("ens/a.eth")),
    );

    let err = client.try_resolve_uri(&uri("ens/a.eth")).await.unwrap_err();
    match err {
        ResolutionError::InfiniteRedirect { chain } => {
            assert_eq!(chain, vec![uri("ens/a.eth"), uri("ens/b.eth"), uri("ens/a.eth")]);
        }
        other => panic!("expected a redirect loop, got {other}"),
    }

    let err = client
        .invoke::<Value>(&uri("ens/a.eth"), "query.double", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), InvokeStage::UriResolution);
    assert!(matches!(err.resolution_error(), Some(ResolutionError::InfiniteRedirect { .. })));
}

#[tokio::test]
async fn test_redirect_chain_is_bounded() {
    let limits = Limits { max_redirects: 3, ..Limits::default() };
    let mut builder = ClientConfig::builder().limits(limits).plugin(uri("plugin/calc"), calc());
    for hop in 0..5 {
        builder = builder.redirect(uri(&format!("chain/{hop}")), uri(&format!("chain/{}", hop + 1)));
    }
    builder = builder.redirect(uri("chain/5"), uri("plugin/calc"));
    let client = client(builder);

    // three hops to the plugin fit the bound
    assert!(client.try_resolve_uri(&uri("chain/3")).await.is_ok());
    assert!(matches!(
        client.try_resolve_uri(&uri("chain/0")).await,
        Err(ResolutionError::InfiniteRedirect { .. })
    ));
}

#[tokio::test]
async fn test_unknown_uri_is_not_found() {
    let client = client(ClientConfig::builder().plugin(uri("plugin/calc"), calc()));
    let err = client
        .invoke::<Value>(&uri("plugin/nothing"), "query.double", &json!({ "x": 1 }))
        .await
        .unwrap_err();
    assert!(matches!(
        err.resolution_error(),
        Some(ResolutionError::NotFound(missing)) if *missing == uri("plugin/nothing")
    ));
    assert_eq!(client.cached_len(), 0);
}

#[tokio::test]
async fn test_method_and_argument_errors() {
    let client = client(ClientConfig::builder().plugin(uri("plugin/calc"), calc()));

    let err = client
        .invoke::<Value>(&uri("plugin/calc"), "query.triple", &json!({ "x": 1 }))
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::MethodNotFound { .. }));
    assert_eq!(err.stage(), InvokeStage::Dispatch);

    let err = client
        .invoke::<Value>(&uri("plugin/calc"), "query.double", &json!({ "x": "many" }))
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::MalformedArguments { .. }));

    let err = client
        .invoke::<String>(&uri("plugin/calc"), "query.double", &json!({ "x": 2 }))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), InvokeStage::ResultDecode);
}

#[tokio::test]
async fn test_interface_selection() {
    let iface = uri("iface/calc");
    let single = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), calc())
            .interface(iface.clone(), [uri("plugin/calc")]),
    );
    let out: i64 = single.invoke(&iface, "query.double", &json!({ "x": 5 })).await.unwrap();
    assert_eq!(out, 10);

    let double = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), calc())
            .plugin(uri("plugin/calc2"), calc())
            .interface(iface.clone(), [uri("plugin/calc"), uri("plugin/calc2")]),
    );
    let err = double.invoke::<i64>(&iface, "query.double", &json!({ "x": 5 })).await.unwrap_err();
    assert!(matches!(&err, InvokeError::AmbiguousImplementation { implementations, .. } if implementations.len() == 2));
    assert_eq!(err.stage(), InvokeStage::InterfaceResolution);

    let pinned = InvokeOptions::new(iface.clone(), "query.double")
        .encoded_args(&json!({ "x": 5 }))
        .unwrap()
        .implementation(uri("plugin/calc2"));
    assert_eq!(double.invoke_with::<i64>(pinned).await.unwrap(), 10);

    let unbound = InvokeOptions::new(iface.clone(), "query.double").implementation(uri("plugin/other"));
    assert!(matches!(
        double.invoke_raw(unbound).await,
        Err(InvokeError::ImplementationNotBound { .. })
    ));
}

#[tokio::test]
async fn test_interface_without_implementations_resolves_itself() {
    let client = client(ClientConfig::builder().interface(uri("iface/empty"), Vec::new()));
    let err = client.invoke::<Value>(&uri("iface/empty"), "query.x", &json!({})).await.unwrap_err();
    assert!(matches!(err.resolution_error(), Some(ResolutionError::NotFound(_))));
}

#[tokio::test]
async fn test_manifest_declared_implementations() {
    let iface = uri("iface/calc");
    let package = PluginPackage::from_table(calc_manifest().implementing(iface.clone()), calc_table());
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), package)
            .redirect(uri("plugin/calc"), uri("plugin/calc-v2"))
            .plugin(uri("plugin/calc-v2"), calc()),
    );

    assert_eq!(client.get_implementations(&iface, false), vec![uri("plugin/calc")]);
    assert_eq!(client.get_implementations(&iface, true), vec![uri("plugin/calc-v2")]);
    let out: i64 = client.invoke(&iface, "query.double", &json!({ "x": 1 })).await.unwrap();
    assert_eq!(out, 2);
}

#[tokio::test]
async fn test_env_layers_by_family() {
    let target = uri("plugin/env");
    let client = client(
        ClientConfig::builder()
            .plugin(target.clone(), env_reader("env"))
            .env(
                EnvRecord::new(target.clone())
                    .with_common(map(json!({ "a": 1, "b": 2 })))
                    .with_query(map(json!({ "b": 3 })))
                    .with_mutation(map(json!({ "b": 4 }))),
            ),
    );

    let query: Value = client.invoke(&target, "query.readEnv", &json!({})).await.unwrap();
    assert_eq!(query, json!({ "a": 1, "b": 3 }));
    let mutation: Value = client.invoke(&target, "mutation.readEnv", &json!({})).await.unwrap();
    assert_eq!(mutation, json!({ "a": 1, "b": 4 }));

    let options = InvokeOptions::new(target.clone(), "query.readEnv").env(map(json!({ "a": 10, "z": true })));
    let overridden: Value = client.invoke_with(options).await.unwrap();
    assert_eq!(overridden, json!({ "a": 10, "b": 3, "z": true }));
}

#[tokio::test]
async fn test_env_follows_redirect_target() {
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/env"), env_reader("env"))
            .redirect(uri("ens/env.eth"), uri("plugin/env"))
            .env(EnvRecord::new(uri("plugin/env")).with_common(map(json!({ "k": "v" })))),
    );
    let env: Value = client.invoke(&uri("ens/env.eth"), "query.readEnv", &json!({})).await.unwrap();
    assert_eq!(env, json!({ "k": "v" }));
}

#[tokio::test]
async fn test_missing_env_is_reported_before_dispatch() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let manifest = WrapManifest::new("needy", WrapKind::Plugin).with_method(MethodDecl {
        env_required: true,
        ..decl(MethodFamily::Mutation, "store")
    });
    let table = MethodTable::new().mutation("store", move |_args, _ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    });
    let client = client(ClientConfig::builder().plugin(uri("plugin/needy"), PluginPackage::from_table(manifest, table)));

    let err = client
        .invoke::<Value>(&uri("plugin/needy"), "mutation.store", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(&err, InvokeError::MissingEnv { family: MethodFamily::Mutation, .. }));
    assert_eq!(err.stage(), InvokeStage::EnvAssembly);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sanitize_env_rewrites_environment() {
    let manifest = WrapManifest::new("sanitized", WrapKind::Plugin)
        .with_method(decl(MethodFamily::Query, "readEnv"))
        .with_method(decl(MethodFamily::Query, "sanitizeEnv"));
    let table = MethodTable::new()
        .query("readEnv", |_args, ctx| async move {
            Ok(ctx.env().cloned().map(Value::Object).unwrap_or(Value::Null))
        })
        .query("sanitizeEnv", |args, _ctx| async move {
            let mut env = args["env"].as_object().cloned().unwrap_or_default();
            env.remove("secret");
            env.insert("sanitized".into(), json!(true));
            Ok(Value::Object(env))
        });
    let target = uri("plugin/sanitized");
    let client = client(
        ClientConfig::builder()
            .plugin(target.clone(), PluginPackage::from_table(manifest, table))
            .env(EnvRecord::new(target.clone()).with_common(map(json!({ "secret": "x", "keep": 1 })))),
    );

    let env: Value = client.invoke(&target, "query.readEnv", &json!({})).await.unwrap();
    assert_eq!(env, json!({ "keep": 1, "sanitized": true }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_current_env_is_per_call() {
    let target = uri("plugin/env");
    let client = client(ClientConfig::builder().plugin(target.clone(), env_reader("env")));

    let calls = (0..32).map(|n| {
        let client = client.clone();
        let target = target.clone();
        tokio::spawn(async move {
            let options = InvokeOptions::new(target, "query.readEnv").env(map(json!({ "n": n })));
            let env: Value = client.invoke_with(options).await.unwrap();
            (n, env)
        })
    });

    for call in futures::future::join_all(calls).await {
        let (n, env) = call.unwrap();
        assert_eq!(env, json!({ "n": n }));
    }
    assert!(plugin::current_env().is_none());
}

#[tokio::test]
async fn test_wrapper_is_cached_once() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let package = PluginPackage::new(calc_manifest(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        calc_table()
    });
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), package)
            .redirect(uri("ens/calc.eth"), uri("plugin/calc")),
    );

    for _ in 0..3 {
        let _: i64 = client.invoke(&uri("ens/calc.eth"), "query.double", &json!({ "x": 1 })).await.unwrap();
    }
    assert_eq!(created.load(Ordering::SeqCst), 1);
    // only the terminal uri is cached, not the redirect
    assert_eq!(client.cached_len(), 1);

    assert!(client.invalidate(&uri("plugin/calc")));
    let _: i64 = client.invoke(&uri("plugin/calc"), "query.double", &json!({ "x": 1 })).await.unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 2);

    client.clear_cache();
    assert_eq!(client.cached_len(), 0);
}

#[tokio::test]
async fn test_concurrent_invocations_share_one_wrapper() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let package = PluginPackage::new(calc_manifest(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        calc_table()
    });
    let client = client(ClientConfig::builder().plugin(uri("plugin/calc"), package));
    let target = uri("plugin/calc");

    let calls = (0..16).map(|x| {
        let client = client.clone();
        let target = target.clone();
        async move { client.invoke::<i64>(&target, "query.double", &json!({ "x": x })).await }
    });
    let results = futures::future::join_all(calls).await;
    for (x, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), x as i64 * 2);
    }
    assert_eq!(client.cached_len(), 1);
    assert!(created.load(Ordering::SeqCst) >= 1);
}

fn forwarder(target: Uri) -> PluginPackage {
    let manifest = WrapManifest::new("forwarder", WrapKind::Plugin).with_method(decl(MethodFamily::Query, "forward"));
    let table = MethodTable::new().query("forward", move |args, ctx| {
        let target = target.clone();
        async move {
            let out: Value = ctx.invoker().invoke(&target, "query.forward", &args).await?;
            Ok::<_, PluginError>(out)
        }
    });
    PluginPackage::from_table(manifest, table)
}

#[tokio::test]
async fn test_sub_invocation_through_plugin() {
    let outer_manifest = WrapManifest::new("outer", WrapKind::Plugin).with_method(decl(MethodFamily::Query, "quadruple"));
    let outer = MethodTable::new().query("quadruple", |args, ctx| async move {
        let calc = Uri::parse("plugin/calc").map_err(|e| PluginError::message(e.to_string()))?;
        let once: i64 = ctx.invoker().invoke(&calc, "query.double", &args).await?;
        let twice: i64 = ctx.invoker().invoke(&calc, "query.double", &json!({ "x": once })).await?;
        Ok::<_, PluginError>(json!(twice))
    });
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), calc())
            .plugin(uri("plugin/outer"), PluginPackage::from_table(outer_manifest, outer)),
    );
    let out: i64 = client.invoke(&uri("plugin/outer"), "query.quadruple", &json!({ "x": 3 })).await.unwrap();
    assert_eq!(out, 12);
}

#[tokio::test]
async fn test_self_recursion_hits_depth_limit() {
    let me = uri("plugin/loop");
    let limits = Limits { max_depth: 6, ..Limits::default() };
    let client = client(ClientConfig::builder().limits(limits).plugin(me.clone(), forwarder(me.clone())));

    let err = client.invoke::<Value>(&me, "query.forward", &json!({})).await.unwrap_err();
    assert!(matches!(err, InvokeError::ExecutionAborted { .. }));
    assert!(matches!(err.root_cause(), InvokeError::RecursionLimitExceeded { limit: 6, .. }));
}

#[tokio::test]
async fn test_mutual_recursion_hits_depth_limit() {
    let a = uri("plugin/ping");
    let b = uri("plugin/pong");
    let client = client(
        ClientConfig::builder()
            .plugin(a.clone(), forwarder(b.clone()))
            .plugin(b.clone(), forwarder(a.clone())),
    );
    let err = client.invoke::<Value>(&a, "query.forward", &json!({})).await.unwrap_err();
    assert!(matches!(err.root_cause(), InvokeError::RecursionLimitExceeded { .. }));
}

#[tokio::test]
async fn test_fan_out_hits_invocation_limit() {
    let me = uri("plugin/fan");
    let target = me.clone();
    let manifest = WrapManifest::new("fan", WrapKind::Plugin).with_method(decl(MethodFamily::Query, "fan"));
    let table = MethodTable::new().query("fan", move |args, ctx| {
        let target = target.clone();
        async move {
            let level = args["level"].as_u64().unwrap_or_default();
            if level == 0 {
                return Ok(json!(1));
            }
            let mut total = 0;
            for _ in 0..4 {
                let n: u64 = ctx.invoker().invoke(&target, "query.fan", &json!({ "level": level - 1 })).await?;
                total += n;
            }
            Ok::<_, PluginError>(json!(total))
        }
    });
    let limits = Limits { max_invocations: 20, ..Limits::default() };
    let client = client(
        ClientConfig::builder()
            .limits(limits)
            .plugin(me.clone(), PluginPackage::from_table(manifest, table)),
    );

    // 1 + 4 + 16 calls fit in 21, not in 20
    let err = client.invoke::<u64>(&me, "query.fan", &json!({ "level": 2 })).await.unwrap_err();
    assert!(matches!(err.root_cause(), InvokeError::InvocationLimitExceeded { limit: 20, .. }));
    let ok: u64 = client.invoke(&me, "query.fan", &json!({ "level": 1 })).await.unwrap();
    assert_eq!(ok, 4);
}

#[tokio::test]
async fn test_plugin_failure_keeps_cause() {
    let manifest = WrapManifest::new("failing", WrapKind::Plugin).with_method(decl(MethodFamily::Query, "fail"));
    let table = MethodTable::new().query("fail", |_args, _ctx| async move {
        Err(PluginError::message("disk on fire"))
    });
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/failing"), PluginPackage::from_table(manifest, table))
            .plugin(uri("plugin/front"), forwarder(uri("plugin/failing"))),
    );

    // the forwarder calls "query.forward" on the failing plugin, which only has "fail"
    let err = client.invoke::<Value>(&uri("plugin/front"), "query.forward", &json!({})).await.unwrap_err();
    assert!(matches!(err.root_cause(), InvokeError::MethodNotFound { .. }));

    let err = client.invoke::<Value>(&uri("plugin/failing"), "query.fail", &json!({})).await.unwrap_err();
    assert!(matches!(&err, InvokeError::ExecutionAborted { message, .. } if message == "disk on fire"));
}

#[tokio::test]
async fn test_override_config_is_scoped_to_the_call() {
    let base = client(ClientConfig::builder().plugin(uri("plugin/calc"), calc()));
    let over = ClientConfig::builder()
        .redirect(uri("ens/calc.eth"), uri("plugin/calc"))
        .build()
        .unwrap();

    let options = InvokeOptions::new(uri("ens/calc.eth"), "query.double")
        .encoded_args(&json!({ "x": 8 }))
        .unwrap()
        .config(over);
    assert_eq!(base.invoke_with::<i64>(options).await.unwrap(), 16);

    // the base client neither learned the redirect nor cached anything for it
    assert_eq!(base.cached_len(), 0);
    let err = base.invoke::<i64>(&uri("ens/calc.eth"), "query.double", &json!({ "x": 8 })).await.unwrap_err();
    assert!(matches!(err.resolution_error(), Some(ResolutionError::NotFound(_))));
}

#[tokio::test]
async fn test_load_wrapper_and_manifest() {
    let client = client(ClientConfig::builder().plugin(uri("plugin/calc"), calc()));
    let wrapper = client.load_wrapper(&uri("plugin/calc")).await.unwrap();
    assert_eq!(wrapper.manifest().name, "calc");
    assert_eq!(client.get_manifest(&uri("plugin/calc")).await.unwrap(), calc_manifest());
}

/// A resolver delegate that waits before answering, counting the calls it gets.
fn slow_resolver(delay: Duration, asked: Arc<AtomicUsize>) -> PluginPackage {
    let manifest = WrapManifest::new("slow-resolver", WrapKind::Plugin)
        .with_method(decl(MethodFamily::Query, "tryResolveUri"))
        .implementing(uri(crate::resolver::DEFAULT_RESOLVER_INTERFACE));
    let table = MethodTable::new().query("tryResolveUri", move |args, _ctx| {
        let asked = asked.clone();
        async move {
            asked.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            if args["authority"] == "slow" {
                Ok(json!({ "uri": "wrap://plugin/calc" }))
            } else {
                Ok(Value::Null)
            }
        }
    });
    PluginPackage::from_table(manifest, table)
}

#[tokio::test]
async fn test_cancelled_resolution_caches_nothing() {
    let asked = Arc::new(AtomicUsize::new(0));
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), calc())
            .plugin(uri("plugin/slow-resolver"), slow_resolver(Duration::from_secs(30), asked.clone())),
    );

    let slow_uri = uri("slow/calc");
    let args = json!({ "x": 1 });
    let call = client.invoke::<i64>(&slow_uri, "query.double", &args);
    assert!(tokio::time::timeout(Duration::from_millis(50), call).await.is_err());
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert!(!client.is_cached(&uri("slow/calc")));
    assert!(!client.is_cached(&uri("plugin/calc")));
}

#[tokio::test]
async fn test_extension_redirect_and_not_found_are_not_cached() {
    let asked = Arc::new(AtomicUsize::new(0));
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), calc())
            .plugin(uri("plugin/slow-resolver"), slow_resolver(Duration::ZERO, asked.clone())),
    );

    for _ in 0..2 {
        let out: i64 = client.invoke(&uri("slow/calc"), "query.double", &json!({ "x": 2 })).await.unwrap();
        assert_eq!(out, 4);
    }
    // the redirect is asked each time, the plugin it lands on is cached
    assert_eq!(asked.load(Ordering::SeqCst), 2);
    assert!(client.is_cached(&uri("plugin/calc")));
    assert!(!client.is_cached(&uri("slow/calc")));
    let cached = client.cached_len();

    for _ in 0..2 {
        let err = client.try_resolve_uri(&uri("nowhere/calc")).await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound(_)));
    }
    assert_eq!(asked.load(Ordering::SeqCst), 4);
    assert_eq!(client.cached_len(), cached);
}

#[tokio::test]
async fn test_explicit_extendable_resolver_on_custom_interface() {
    let asked = Arc::new(AtomicUsize::new(0));
    let custom = uri("iface/resolvers");
    let delegate = slow_resolver(Duration::ZERO, asked.clone());
    let client = client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), calc())
            .plugin(uri("plugin/slow-resolver"), delegate)
            .resolver_interface(custom.clone())
            .interface(custom.clone(), [uri("plugin/slow-resolver")])
            .resolver(ExtendableResolver::new(uri(crate::resolver::DEFAULT_RESOLVER_INTERFACE))),
    );

    let resolution = client.try_resolve_uri(&uri("slow/calc")).await.unwrap();
    assert_eq!(resolution.final_uri, uri("plugin/calc"));
    // consulted once through the default-interface resolver, never twice
    assert_eq!(asked.load(Ordering::SeqCst), 1);
}

/// A resolver delegate whose backend is down.
fn offline_resolver() -> PluginPackage {
    let manifest = WrapManifest::new("offline-resolver", WrapKind::Plugin)
        .with_method(decl(MethodFamily::Query, "tryResolveUri"));
    let table = MethodTable::new().query("tryResolveUri", |_args, _ctx| async move {
        Err(PluginError::message("index offline"))
    });
    PluginPackage::from_table(manifest, table)
}

/// A resolver delegate that claims every uri but never serves the module file.
fn hollow_resolver() -> PluginPackage {
    let manifest = WrapManifest::new("hollow-resolver", WrapKind::Plugin)
        .with_method(decl(MethodFamily::Query, "tryResolveUri"))
        .with_method(decl(MethodFamily::Query, "getFile"));
    let package_manifest = WrapManifest::new("hollow", WrapKind::Wasm).to_bytes().unwrap();
    let table = MethodTable::new()
        .query("tryResolveUri", move |_args, _ctx| {
            let package_manifest = package_manifest.clone();
            async move { Ok(json!({ "manifest": package_manifest })) }
        })
        .query("getFile", |_args, _ctx| async move { Ok(Value::Null) });
    PluginPackage::from_table(manifest, table)
}

fn with_first_resolver(delegate: PluginPackage, asked: Arc<AtomicUsize>) -> Client {
    let first = uri("iface/first-resolvers");
    client(
        ClientConfig::builder()
            .plugin(uri("plugin/calc"), calc())
            .plugin(uri("plugin/first-resolver"), delegate)
            .plugin(uri("plugin/slow-resolver"), slow_resolver(Duration::ZERO, asked))
            .interface(first.clone(), [uri("plugin/first-resolver")])
            .resolver(ExtendableResolver::new(first)),
    )
}

#[tokio::test]
async fn test_backend_failure_falls_through_to_later_resolvers() {
    let asked = Arc::new(AtomicUsize::new(0));
    let client = with_first_resolver(offline_resolver(), asked.clone());

    let resolution = client.try_resolve_uri(&uri("slow/calc")).await.unwrap();
    assert_eq!(resolution.final_uri, uri("plugin/calc"));
    assert_eq!(asked.load(Ordering::SeqCst), 1);

    // nobody else answers, so the held failure is what the caller sees
    let err = client.try_resolve_uri(&uri("nowhere/calc")).await.unwrap_err();
    let ResolutionError::BackendFailure { reason, .. } = err else {
        panic!("expected a backend failure, got {err}");
    };
    assert!(reason.contains("index offline"));
    assert_eq!(asked.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_package_stops_later_resolvers() {
    let asked = Arc::new(AtomicUsize::new(0));
    let client = with_first_resolver(hollow_resolver(), asked.clone());

    let err = client.try_resolve_uri(&uri("slow/calc")).await.unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidPackage { .. }));
    assert_eq!(asked.load(Ordering::SeqCst), 0);
    assert!(!client.is_cached(&uri("slow/calc")));
}
