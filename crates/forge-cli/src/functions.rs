// forge-cli/src/functions.rs
// ============================================================================
// Module: Builtin Functions
// Description: The concrete, real (non-test) functions registered into
//              forge-executor's FunctionRegistry at startup.
// Purpose: forge-executor defines the ProcedureFunction trait and the four
//          flow-control primitives it dispatches internally; every other
//          function a procedure step can name has to actually be
//          registered somewhere, and that's a composition-root concern.
// Dependencies: async-trait, forge-executor, reqwest, serde_json, tracing
// ============================================================================

use std::time::Instant;

use async_trait::async_trait;
use forge_executor::context::ExecutionContext;
use forge_executor::registry::FunctionMeta;
use forge_executor::registry::FunctionRegistry;
use forge_executor::registry::ProcedureFunction;
use forge_executor::result::FunctionResult;
use serde_json::Value as Json;

/// Builds the registry every procedure executor shares, with the builtin
/// functions every deployment gets regardless of configuration.
#[must_use]
pub fn builtins() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register("log", std::sync::Arc::new(LogFunction));
    registry.register("http_request", std::sync::Arc::new(HttpRequestFunction::new()));
    registry
}

/// Writes `params.message` (or the whole params payload, if no `message`
/// key is present) to the tracing log at info level. Side-effect free: it
/// only touches the process's own log stream.
struct LogFunction;

#[async_trait]
impl ProcedureFunction for LogFunction {
    fn meta(&self) -> &FunctionMeta {
        static META: std::sync::OnceLock<FunctionMeta> = std::sync::OnceLock::new();
        META.get_or_init(|| FunctionMeta::plain("log"))
    }

    async fn call(&self, ctx: &ExecutionContext, params: Json) -> FunctionResult {
        let started = Instant::now();
        let message = params.get("message").and_then(Json::as_str).map_or_else(|| params.to_string(), ToString::to_string);
        tracing::info!(run_id = %ctx.run_id, "{message}");
        FunctionResult::success(params, elapsed_ms(started))
    }
}

/// Issues an HTTP request and returns its status and body. Declared
/// side-effecting: it can reach an arbitrary external system.
///
/// Params: `{method, url, headers?, body?}`. `method` defaults to `"GET"`.
struct HttpRequestFunction {
    /// Shared client so repeated calls reuse connections.
    http: reqwest::Client,
}

impl HttpRequestFunction {
    /// Builds the function with a fresh client.
    fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

#[async_trait]
impl ProcedureFunction for HttpRequestFunction {
    fn meta(&self) -> &FunctionMeta {
        static META: std::sync::OnceLock<FunctionMeta> = std::sync::OnceLock::new();
        META.get_or_init(|| FunctionMeta::side_effecting("http"))
    }

    async fn call(&self, _ctx: &ExecutionContext, params: Json) -> FunctionResult {
        let started = Instant::now();
        let Some(url) = params.get("url").and_then(Json::as_str) else {
            return FunctionResult::failure("http_request requires a 'url' string param", elapsed_ms(started));
        };
        let method = params.get("method").and_then(Json::as_str).unwrap_or("GET").to_ascii_uppercase();
        let Ok(method) = reqwest::Method::from_bytes(method.as_bytes()) else {
            return FunctionResult::failure(format!("unsupported HTTP method {method:?}"), elapsed_ms(started));
        };

        let mut request = self.http.request(method, url);
        if let Some(headers) = params.get("headers").and_then(Json::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }
        if let Some(body) = params.get("body") {
            request = request.json(body);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let data = serde_json::json!({"status": status, "body": body});
                if status >= 400 {
                    FunctionResult::failure(format!("http_request received status {status}"), elapsed_ms(started))
                } else {
                    FunctionResult::success(data, elapsed_ms(started))
                }
            }
            Err(error) => FunctionResult::failure(error.to_string(), elapsed_ms(started)),
        }
    }
}

/// Milliseconds elapsed since `started`, saturating rather than
/// overflowing for implausibly long calls.
fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use forge_core::ids::OrganizationId;
    use forge_core::ids::RunId;

    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext { organization_id: OrganizationId::new(), run_id: RunId::new(), user_id: None, dry_run: false }
    }

    #[tokio::test]
    async fn log_function_echoes_params_as_success() {
        let function = LogFunction;
        let result = function.call(&ctx(), serde_json::json!({"message": "hello"})).await;
        assert!(matches!(result.status, forge_executor::result::FunctionStatus::Success));
    }

    #[tokio::test]
    async fn http_request_without_url_fails() {
        let function = HttpRequestFunction::new();
        let result = function.call(&ctx(), serde_json::json!({})).await;
        assert!(matches!(result.status, forge_executor::result::FunctionStatus::Failed));
    }

    #[test]
    fn builtins_registers_log_and_http_request() {
        let registry = builtins();
        assert!(registry.resolve("log").is_some());
        assert!(registry.resolve("http_request").is_some());
    }
}
