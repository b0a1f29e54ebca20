//! Example guest for bridge-runtime.
//!
//! ```text
//! bridge-runtime --module hello_mod=target/wasm32-unknown-unknown/release/echo_guest.wasm \
//!     call hello_mod echo --params '{"msg":"hello world"}'
//! ```

use bridge_runtime_guest::{Dispatcher, call_host, export_guest, log};
use serde_json::{Value, json};

/// Methods exported by this guest.
pub fn dispatcher() -> Dispatcher {
    Dispatcher::new()
        .with("echo", |params| Ok(Value::Object(params)))
        .with("ping", |_| Ok(json!("pong")))
        .with("stat", |_| {
            let builtins = call_host("list_builtins", None).map_err(|e| e.to_string())?;
            log(&format!("stat: {builtins}"));
            Ok(json!("OK"))
        })
}

export_guest!(dispatcher());
