//! Integration tests for bridge-runtime-host.
//!
//! These tests drive hand-written WAT guests through the full pipeline:
//! - Module loading and instantiation
//! - Host → guest calls through the marshaling protocol
//! - Guest → host calls through `call_host`
//! - Guest logging
//! - Allocation balance, protocol failures and concurrency

use std::sync::Arc;

use serde_json::{Value, json};

use bridge_runtime_common::{
    DuplicatePolicy, HostFunctionError, Params, RuntimeConfig, RuntimeError,
};
use bridge_runtime_core::HostRegistry;
use bridge_runtime_host::HostRuntime;

/// A guest with a counting bump allocator.
///
/// Methods:
/// - `echo`: returns its params
/// - `stat`: calls `list_builtins` on the host and logs the raw response
/// - `live`: returns the number of outstanding allocations
/// - `garbage`: returns bytes that are not JSON
/// - `overflow`: returns a channel longer than memory
/// - `nothing`: returns the null channel
/// - anything else: `{"error":"method not found"}`
const HELLO_GUEST: &str = r#"
(module
    (import "env" "call_host" (func $call_host (param i32 i32) (result i64)))
    (import "env" "log" (func $log (param i32 i32)))

    (memory (export "memory") 4)

    (global $heap (mut i32) (i32.const 1024))
    (global $live (mut i32) (i32.const 0))

    (data (i32.const 16) "{\"method\":\"echo\",\"params\":")
    (data (i32.const 64) "{\"result\":")
    (data (i32.const 96) "{\"error\":\"method not found\"}")
    (data (i32.const 160) "{\"method\":\"stat\"")
    (data (i32.const 192) "{\"method\":\"list_builtins\"}")
    (data (i32.const 256) "{\"result\":\"OK\"}")
    (data (i32.const 320) "{\"method\":\"live\"")
    (data (i32.const 352) "{\"method\":\"garbage\"")
    (data (i32.const 384) "{\"method\":\"overflow\"")
    (data (i32.const 416) "{\"method\":\"nothing\"")

    (func $malloc (export "malloc") (param $len i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get $len)))
        (global.set $live (i32.add (global.get $live) (i32.const 1)))
        (local.get $ptr))

    (func $free (export "free") (param $ptr i32)
        (if (local.get $ptr)
            (then (global.set $live (i32.sub (global.get $live) (i32.const 1))))))

    (func $pack (param $ptr i32) (param $len i32) (result i64)
        (i64.or
            (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
            (i64.extend_i32_u (local.get $len))))

    (func $reply (param $src i32) (param $len i32) (result i64)
        (local $out i32)
        (local.set $out (call $malloc (local.get $len)))
        (memory.copy (local.get $out) (local.get $src) (local.get $len))
        (call $pack (local.get $out) (local.get $len)))

    (func $starts_with (param $ptr i32) (param $len i32) (param $prefix i32) (param $plen i32) (result i32)
        (local $i i32)
        (if (i32.lt_u (local.get $len) (local.get $plen))
            (then (return (i32.const 0))))
        (block $done
            (loop $next
                (br_if $done (i32.ge_u (local.get $i) (local.get $plen)))
                (if (i32.ne
                        (i32.load8_u (i32.add (local.get $ptr) (local.get $i)))
                        (i32.load8_u (i32.add (local.get $prefix) (local.get $i))))
                    (then (return (i32.const 0))))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $next)))
        (i32.const 1))

    (func (export "do") (param $ptr i32) (param $len i32) (result i64)
        (local $out i32)
        (local $out_len i32)
        (local $r i64)

        ;; echo: {"result": + everything after the params key
        (if (call $starts_with (local.get $ptr) (local.get $len) (i32.const 16) (i32.const 26))
            (then
                (local.set $out_len (i32.sub (local.get $len) (i32.const 16)))
                (local.set $out (call $malloc (local.get $out_len)))
                (memory.copy (local.get $out) (i32.const 64) (i32.const 10))
                (memory.copy
                    (i32.add (local.get $out) (i32.const 10))
                    (i32.add (local.get $ptr) (i32.const 26))
                    (i32.sub (local.get $len) (i32.const 26)))
                (call $free (local.get $ptr))
                (return (call $pack (local.get $out) (local.get $out_len)))))

        (call $free (local.get $ptr))

        (if (call $starts_with (local.get $ptr) (local.get $len) (i32.const 160) (i32.const 16))
            (then
                (local.set $r (call $call_host (i32.const 192) (i32.const 26)))
                (if (i64.ne (local.get $r) (i64.const 0))
                    (then
                        (call $log
                            (i32.wrap_i64 (i64.shr_u (local.get $r) (i64.const 32)))
                            (i32.wrap_i64 (local.get $r)))
                        (call $free (i32.wrap_i64 (i64.shr_u (local.get $r) (i64.const 32))))))
                (return (call $reply (i32.const 256) (i32.const 15)))))

        (if (call $starts_with (local.get $ptr) (local.get $len) (i32.const 320) (i32.const 16))
            (then
                (local.set $out (call $malloc (i32.const 12)))
                (memory.copy (local.get $out) (i32.const 64) (i32.const 10))
                (i32.store8
                    (i32.add (local.get $out) (i32.const 10))
                    (i32.add (i32.const 48) (i32.sub (global.get $live) (i32.const 1))))
                (i32.store8 (i32.add (local.get $out) (i32.const 11)) (i32.const 125))
                (return (call $pack (local.get $out) (i32.const 12)))))

        (if (call $starts_with (local.get $ptr) (local.get $len) (i32.const 352) (i32.const 19))
            (then (return (call $reply (i32.const 64) (i32.const 10)))))

        (if (call $starts_with (local.get $ptr) (local.get $len) (i32.const 384) (i32.const 20))
            (then
                (local.set $out (call $malloc (i32.const 4)))
                (return (call $pack (local.get $out) (i32.const 0x100000)))))

        (if (call $starts_with (local.get $ptr) (local.get $len) (i32.const 416) (i32.const 19))
            (then (return (i64.const 0))))

        (call $reply (i32.const 96) (i32.const 28)))
)
"#;

/// A guest that always answers `{"result":"v2"}`.
const V2_GUEST: &str = r#"
(module
    (memory (export "memory") 1)
    (global $heap (mut i32) (i32.const 1024))
    (data (i32.const 16) "{\"result\":\"v2\"}")
    (func $malloc (export "malloc") (param $len i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get $len)))
        (local.get $ptr))
    (func (export "free") (param i32))
    (func (export "do") (param i32 i32) (result i64)
        (local $out i32)
        (local.set $out (call $malloc (i32.const 15)))
        (memory.copy (local.get $out) (i32.const 16) (i32.const 15))
        (i64.or
            (i64.shl (i64.extend_i32_u (local.get $out)) (i64.const 32))
            (i64.const 15)))
)
"#;

/// A guest that forwards every request envelope to `call_host`, logs the
/// raw response and answers `{"result":"OK"}`.
const RELAY_GUEST: &str = r#"
(module
    (import "env" "call_host" (func $call_host (param i32 i32) (result i64)))
    (import "env" "log" (func $log (param i32 i32)))
    (memory (export "memory") 1)
    (global $heap (mut i32) (i32.const 1024))
    (data (i32.const 16) "{\"result\":\"OK\"}")
    (func $malloc (export "malloc") (param $len i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get $len)))
        (local.get $ptr))
    (func $free (export "free") (param i32))
    (func (export "do") (param $ptr i32) (param $len i32) (result i64)
        (local $r i64)
        (local $out i32)
        (local.set $r (call $call_host (local.get $ptr) (local.get $len)))
        (if (i64.ne (local.get $r) (i64.const 0))
            (then
                (call $log
                    (i32.wrap_i64 (i64.shr_u (local.get $r) (i64.const 32)))
                    (i32.wrap_i64 (local.get $r)))
                (call $free (i32.wrap_i64 (i64.shr_u (local.get $r) (i64.const 32))))))
        (local.set $out (call $malloc (i32.const 15)))
        (memory.copy (local.get $out) (i32.const 16) (i32.const 15))
        (i64.or
            (i64.shl (i64.extend_i32_u (local.get $out)) (i64.const 32))
            (i64.const 15)))
)
"#;

/// A guest whose start function traps unless `call_host` returns 0.
const EAGER_GUEST: &str = r#"
(module
    (import "env" "call_host" (func $call_host (param i32 i32) (result i64)))
    (memory (export "memory") 1)
    (global $heap (mut i32) (i32.const 1024))
    (data (i32.const 16) "{\"method\":\"list_builtins\"}")
    (func $malloc (export "malloc") (param $len i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get $len)))
        (local.get $ptr))
    (func (export "free") (param i32))
    (func (export "do") (param i32 i32) (result i64) (i64.const 0))
    (func $init
        (if (i64.ne (call $call_host (i32.const 16) (i32.const 26)) (i64.const 0))
            (then unreachable)))
    (start $init)
)
"#;

fn config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.abi.inherit_stdio = false;
    config
}

async fn runtime_with_hello() -> HostRuntime {
    let mut runtime = HostRuntime::with_defaults(config()).unwrap();
    runtime.init().unwrap();
    runtime.load_module_wat("hello_mod", HELLO_GUEST).await.unwrap();
    runtime
}

fn params(value: Value) -> Option<Params> {
    match value {
        Value::Object(map) => Some(map),
        _ => panic!("params must be an object"),
    }
}

async fn live_allocations(runtime: &HostRuntime) -> Value {
    runtime.call("hello_mod", "live", None).await.unwrap()
}

// ============================================================================
// Test: Host → Guest Calls
// ============================================================================

#[tokio::test]
async fn test_echo() {
    let runtime = runtime_with_hello().await;

    let result = runtime
        .call("hello_mod", "echo", params(json!({"msg": "hello world"})))
        .await
        .unwrap();

    assert_eq!(result, json!({"msg": "hello world"}));
}

#[tokio::test]
async fn test_echo_preserves_nested_json() {
    let runtime = runtime_with_hello().await;
    let payload = json!({
        "list": [1, 2.5, null, true, "x"],
        "nested": {"deep": {"unicode": "héllo ✓"}},
    });

    let result = runtime
        .call("hello_mod", "echo", params(payload.clone()))
        .await
        .unwrap();

    assert_eq!(result, payload);
}

#[tokio::test]
async fn test_unknown_guest_method() {
    let runtime = runtime_with_hello().await;

    let err = runtime.call("hello_mod", "ping", None).await.unwrap_err();

    assert!(err.is_application());
    assert_eq!(err.application_message(), Some("method not found"));
}

#[tokio::test]
async fn test_allocations_balance_after_calls() {
    let runtime = runtime_with_hello().await;

    for i in 0..10 {
        runtime
            .call("hello_mod", "echo", params(json!({"i": i})))
            .await
            .unwrap();
    }
    runtime.call("hello_mod", "ping", None).await.unwrap_err();
    runtime.call("hello_mod", "stat", None).await.unwrap();

    assert_eq!(live_allocations(&runtime).await, json!(0));
}

// ============================================================================
// Test: Guest → Host Calls
// ============================================================================

#[tokio::test]
async fn test_stat_calls_host_and_logs() {
    let runtime = runtime_with_hello().await;

    let result = runtime.call("hello_mod", "stat", None).await.unwrap();
    assert_eq!(result, json!("OK"));

    let logs = runtime.take_logs("hello_mod").await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(
        logs[0].message,
        r#"{"result":["list_builtins","list_modules"]}"#
    );
    assert!(logs[0].call_id.is_some());

    // Drained.
    assert!(runtime.take_logs("hello_mod").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_call_host_outside_call_fails_closed() {
    let mut runtime = HostRuntime::with_defaults(config()).unwrap();
    runtime.init().unwrap();

    // The start function traps if call_host returns anything but 0.
    runtime.load_module_wat("eager", EAGER_GUEST).await.unwrap();

    assert_eq!(runtime.list_modules(), vec!["eager"]);
}

// ============================================================================
// Test: Protocol Failures
// ============================================================================

#[tokio::test]
async fn test_invalid_response_json() {
    let runtime = runtime_with_hello().await;

    let err = runtime.call("hello_mod", "garbage", None).await.unwrap_err();

    assert!(matches!(err, RuntimeError::Protocol { .. }));
    assert_eq!(live_allocations(&runtime).await, json!(0));
}

#[tokio::test]
async fn test_out_of_range_response() {
    let runtime = runtime_with_hello().await;

    let err = runtime.call("hello_mod", "overflow", None).await.unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::MemoryOutOfRange { len: 0x0010_0000, .. }
    ));
    // The response pointer was still freed.
    assert_eq!(live_allocations(&runtime).await, json!(0));
}

#[tokio::test]
async fn test_null_response() {
    let runtime = runtime_with_hello().await;

    let err = runtime.call("hello_mod", "nothing", None).await.unwrap_err();

    assert!(matches!(err, RuntimeError::Protocol { .. }));
    assert_eq!(live_allocations(&runtime).await, json!(0));
}

// ============================================================================
// Test: Module Lifecycle
// ============================================================================

#[tokio::test]
async fn test_unknown_module() {
    let runtime = runtime_with_hello().await;

    let err = runtime.call("missing", "echo", None).await.unwrap_err();

    assert!(matches!(err, RuntimeError::ModuleNotFound { ref module_id } if module_id == "missing"));
    assert_eq!(live_allocations(&runtime).await, json!(0));
}

#[tokio::test]
async fn test_load_before_init() {
    let runtime = HostRuntime::with_defaults(config()).unwrap();

    let err = runtime
        .load_module_wat("hello_mod", HELLO_GUEST)
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::NotInitialized));
}

#[tokio::test]
async fn test_malformed_binary() {
    let mut runtime = HostRuntime::with_defaults(config()).unwrap();
    runtime.init().unwrap();

    let err = runtime.load_module("bad", b"definitely not wasm").await.unwrap_err();
    assert!(matches!(err, RuntimeError::Instantiation { .. }));

    let truncated = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0x01];
    let err = runtime.load_module("bad", &truncated).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Instantiation { .. }));

    assert!(runtime.list_modules().is_empty());
}

#[tokio::test]
async fn test_missing_guest_exports() {
    let mut runtime = HostRuntime::with_defaults(config()).unwrap();
    runtime.init().unwrap();

    let err = runtime
        .load_module_wat("bare", r#"(module (memory (export "memory") 1))"#)
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Instantiation { .. }));
}

#[tokio::test]
async fn test_replace_module() {
    let runtime = runtime_with_hello().await;

    runtime.load_module_wat("hello_mod", V2_GUEST).await.unwrap();

    let result = runtime.call("hello_mod", "echo", None).await.unwrap();
    assert_eq!(result, json!("v2"));
    assert_eq!(runtime.list_modules(), vec!["hello_mod"]);
}

#[tokio::test]
async fn test_unload_module() {
    let runtime = runtime_with_hello().await;

    runtime.unload_module("hello_mod").unwrap();

    assert!(runtime.list_modules().is_empty());
    let err = runtime.call("hello_mod", "echo", None).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_modules_from_guest_view() {
    let runtime = runtime_with_hello().await;
    runtime.load_module_wat("b_mod", V2_GUEST).await.unwrap();

    assert_eq!(runtime.list_modules(), vec!["b_mod", "hello_mod"]);
    assert_eq!(runtime.list_builtins(), vec!["list_builtins", "list_modules"]);
}

async fn runtime_with_relay() -> HostRuntime {
    let mut registry = HostRegistry::new(DuplicatePolicy::Reject);
    registry
        .register("curl", |_, _| Err(HostFunctionError::failed("upstream unavailable")))
        .unwrap();

    let mut runtime = HostRuntime::new(config(), registry).unwrap();
    runtime.init().unwrap();
    runtime.load_module_wat("relay_mod", RELAY_GUEST).await.unwrap();
    runtime
}

async fn relayed(runtime: &HostRuntime, method: &str) -> Vec<String> {
    let result = runtime.call("relay_mod", method, None).await.unwrap();
    assert_eq!(result, json!("OK"));

    runtime
        .take_logs("relay_mod")
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.message)
        .collect()
}

#[tokio::test]
async fn test_call_host_failing_function_error_is_verbatim() {
    let runtime = runtime_with_relay().await;

    let logs = relayed(&runtime, "curl").await;
    assert_eq!(logs, vec![r#"{"error":"upstream unavailable"}"#]);
}

#[tokio::test]
async fn test_call_host_unknown_method() {
    let runtime = runtime_with_relay().await;

    let logs = relayed(&runtime, "nope").await;
    assert_eq!(logs, vec![r#"{"error":"method not found: nope"}"#]);
}

#[tokio::test]
async fn test_call_host_success_envelope() {
    let runtime = runtime_with_relay().await;

    let logs = relayed(&runtime, "list_modules").await;
    assert_eq!(logs, vec![r#"{"result":["relay_mod"]}"#]);
}

// ============================================================================
// Test: Module Table
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_load_and_unload_keep_listing_consistent() {
    let mut runtime = HostRuntime::with_defaults(config()).unwrap();
    runtime.init().unwrap();
    let runtime = Arc::new(runtime);

    for _ in 0..16 {
        let load = {
            let runtime = Arc::clone(&runtime);
            tokio::spawn(async move { runtime.load_module_wat("v2_mod", V2_GUEST).await })
        };
        let unload = {
            let runtime = Arc::clone(&runtime);
            tokio::spawn(async move { runtime.unload_module("v2_mod") })
        };

        load.await.unwrap().unwrap();
        let _ = unload.await.unwrap();

        let listed = runtime.list_modules().contains(&"v2_mod".to_string());
        let callable = runtime.call("v2_mod", "echo", None).await.is_ok();
        assert_eq!(listed, callable);

        let _ = runtime.unload_module("v2_mod");
    }
}

// ============================================================================
// Test: Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_are_serialized() {
    let runtime = Arc::new(runtime_with_hello().await);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let runtime = Arc::clone(&runtime);
            tokio::spawn(async move {
                let result = runtime
                    .call("hello_mod", "echo", params(json!({"task": i})))
                    .await
                    .unwrap();
                assert_eq!(result, json!({"task": i}));
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(live_allocations(&runtime).await, json!(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_across_modules() {
    let runtime = runtime_with_hello().await;
    runtime.load_module_wat("v2_mod", V2_GUEST).await.unwrap();
    let runtime = Arc::new(runtime);

    let hello = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.call("hello_mod", "stat", None).await })
    };
    let v2 = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.call("v2_mod", "anything", None).await })
    };

    assert_eq!(hello.await.unwrap().unwrap(), json!("OK"));
    assert_eq!(v2.await.unwrap().unwrap(), json!("v2"));
}
