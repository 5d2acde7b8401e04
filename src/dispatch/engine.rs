//! Dispatch engine: the single path every tool call takes.
//!
//! `Received -> Validated -> Authorized -> Executing -> Completed`, or
//! `Rejected` at whichever stage fails first. Whatever the handler does
//! (returns, errors, panics, hangs), exactly one [`CallResult`] comes back.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use super::result::{ArgumentError, CallRequest, CallResult, CallStage, Failure};
use crate::guard::{Admission, PathGuard, RateLimiter};
use crate::tools::{
    validate, CallContext, HandlerError, SideEffectClass, ToolDescriptor, ToolRegistry,
    ValidatedArguments,
};
use crate::types::{CallId, Config, RateLimitKey};

/// Longest handler error message returned to callers.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 512;

const PANIC_MESSAGE: &str = "tool handler panicked";

/// Routes calls through validation, guards and the handler.
///
/// Registry, guard and limiter are injected so tests can share or swap them.
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    registry: Arc<ToolRegistry>,
    guard: Arc<PathGuard>,
    limiter: Arc<RateLimiter>,
    key_by: RateLimitKey,
    call_timeout: Duration,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        guard: Arc<PathGuard>,
        limiter: Arc<RateLimiter>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            guard,
            limiter,
            key_by: RateLimitKey::Host,
            call_timeout,
        }
    }

    /// Build an engine with limiter and timeout taken from `config`.
    pub fn from_config(registry: Arc<ToolRegistry>, guard: Arc<PathGuard>, config: &Config) -> Self {
        Self::new(
            registry,
            guard,
            Arc::new(RateLimiter::new(&config.rate_limit)),
            config.dispatch.call_timeout,
        )
        .with_key_by(config.rate_limit.key_by)
    }

    pub fn with_key_by(mut self, key_by: RateLimitKey) -> Self {
        self.key_by = key_by;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &Arc<PathGuard> {
        &self.guard
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Dispatch one call.
    ///
    /// Dropping the returned future abandons the handler. Rate-limit counts
    /// are only taken at admission, so an abandoned call never leaves the
    /// limiter inconsistent.
    pub async fn dispatch(&self, request: CallRequest) -> CallResult {
        let call_id = CallId::new();
        let span = tracing::info_span!(
            "tool_call",
            call_id = %call_id,
            tool = %request.tool,
            outcome = tracing::field::Empty,
        );
        async move {
            let result = self.run(call_id, request).await;
            let stage = match &result {
                CallResult::Success(_) => CallStage::Completed,
                CallResult::Failure(_) => CallStage::Rejected,
            };
            tracing::Span::current().record("outcome", tracing::field::display(stage));
            match &result {
                CallResult::Success(_) => tracing::debug!(stage = %stage, "call finished"),
                CallResult::Failure(failure) if failure.kind().retryable() => {
                    tracing::info!(stage = %stage, kind = %failure.kind(), "call rejected")
                }
                CallResult::Failure(failure) => {
                    tracing::warn!(stage = %stage, kind = %failure.kind(), error = %failure.message(), "call failed")
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, call_id: CallId, request: CallRequest) -> CallResult {
        tracing::debug!(stage = %CallStage::Received, "dispatching");

        let tool = match self.registry.lookup(&request.tool) {
            Ok(tool) => tool,
            Err(_) => {
                return Failure::UnknownTool {
                    name: request.tool,
                }
                .into()
            }
        };
        let descriptor = tool.descriptor();

        let args = match validate(&descriptor.input_schema, &request.arguments) {
            Ok(args) => args,
            Err(e) => return Failure::InvalidArguments(ArgumentError::Schema(e)).into(),
        };
        tracing::debug!(stage = %CallStage::Validated, "arguments valid");

        if let Err(failure) = self.authorize(descriptor, &args) {
            return failure.into();
        }
        tracing::debug!(stage = %CallStage::Authorized, "side effects authorized");

        let ctx = CallContext::new(call_id, descriptor.name.as_str(), self.guard.clone());
        tracing::debug!(stage = %CallStage::Executing, timeout = ?self.call_timeout, "handler started");

        let execution = AssertUnwindSafe(tool.handler().call(args, ctx)).catch_unwind();
        match tokio::time::timeout(self.call_timeout, execution).await {
            Err(_) => Failure::Timeout {
                after: self.call_timeout,
            }
            .into(),
            Ok(Err(panic)) => {
                tracing::error!(panic = %panic_message(panic.as_ref()), "handler panicked");
                Failure::HandlerError {
                    message: PANIC_MESSAGE.to_string(),
                }
                .into()
            }
            Ok(Ok(Ok(payload))) => CallResult::Success(payload),
            Ok(Ok(Err(e))) => self.classify(e).into(),
        }
    }

    /// Path containment for declared path fields, then the rate limiter for
    /// network tools.
    fn authorize(&self, descriptor: &ToolDescriptor, args: &ValidatedArguments) -> Result<(), Failure> {
        for field in &descriptor.path_fields {
            let Some(raw) = args.str(&field.name) else {
                continue;
            };
            if let Err(error) = self.guard.resolve(raw, field.access, field.kind) {
                return Err(Failure::SecurityViolation {
                    field: Some(field.name.clone()),
                    error,
                });
            }
        }

        if descriptor.side_effect == SideEffectClass::Network {
            let key = self.rate_key(descriptor, args);
            if let Admission::Rejected { retry_after } = self.limiter.admit(&key) {
                return Err(Failure::RateLimited { key, retry_after });
            }
        }
        Ok(())
    }

    fn rate_key(&self, descriptor: &ToolDescriptor, args: &ValidatedArguments) -> String {
        if self.key_by == RateLimitKey::Host {
            let host = descriptor
                .url_field
                .as_deref()
                .and_then(|field| args.str(field))
                .and_then(|raw| reqwest::Url::parse(raw).ok())
                .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
            if let Some(host) = host {
                return format!("host:{host}");
            }
        }
        format!("tool:{}", descriptor.name)
    }

    fn classify(&self, err: HandlerError) -> Failure {
        match err {
            HandlerError::InvalidInput(msg) => {
                Failure::InvalidArguments(ArgumentError::Handler(self.sanitize(&msg)))
            }
            HandlerError::Security(error) => Failure::SecurityViolation {
                field: None,
                error: error.map_text(|text| self.sanitize(text)),
            },
            HandlerError::Failed(msg) => Failure::HandlerError {
                message: self.sanitize(&msg),
            },
        }
    }

    /// Redact sandbox roots and cap the length.
    fn sanitize(&self, message: &str) -> String {
        let redacted = self.guard.redact(message);
        if redacted.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
            return redacted;
        }
        let mut capped: String = redacted.chars().take(MAX_ERROR_MESSAGE_CHARS - 3).collect();
        capped.push_str("...");
        capped
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{AccessMode, PathKind};
    use crate::tools::{Schema, ToolDescriptor};
    use crate::types::RateLimitConfig;
    use serde_json::{json, Value};

    async fn echo(args: ValidatedArguments, _ctx: CallContext) -> Result<Value, HandlerError> {
        Ok(args.into_value())
    }

    fn engine_with(registry: ToolRegistry, timeout: Duration) -> DispatchEngine {
        DispatchEngine::new(
            Arc::new(registry),
            Arc::new(PathGuard::new(Vec::<String>::new(), Vec::<String>::new())),
            Arc::new(RateLimiter::new(&RateLimitConfig {
                window: Duration::from_secs(60),
                max_calls: 2,
                key_by: RateLimitKey::Host,
            })),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_success_payload_is_untouched() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("echo", "echo", Schema::object().required("x", Schema::integer())),
                echo,
            )
            .unwrap();
        let engine = engine_with(registry, Duration::from_secs(5));

        let result = engine.dispatch(CallRequest::new("echo", json!({"x": 4, "extra": true}))).await;
        assert_eq!(result, CallResult::Success(json!({"x": 4, "extra": true})));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_handler_error() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("boom", "panics", Schema::object()),
                |_args: ValidatedArguments, _ctx: CallContext| async move {
                    if true {
                        panic!("secret internal detail");
                    }
                    Ok::<Value, HandlerError>(Value::Null)
                },
            )
            .unwrap();
        let engine = engine_with(registry, Duration::from_secs(5));

        let result = engine.dispatch(CallRequest::new("boom", Value::Null)).await;
        assert_eq!(
            result,
            CallResult::Failure(Failure::HandlerError {
                message: PANIC_MESSAGE.into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_handler_times_out() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("hang", "never returns", Schema::object()),
                |_args: ValidatedArguments, _ctx: CallContext| async move {
                    futures::future::pending::<()>().await;
                    Ok::<Value, HandlerError>(Value::Null)
                },
            )
            .unwrap();
        let engine = engine_with(registry, Duration::from_millis(50));

        let result = engine.dispatch(CallRequest::new("hang", Value::Null)).await;
        let failure = result.failure().unwrap();
        assert_eq!(failure, &Failure::Timeout { after: Duration::from_millis(50) });
        assert!(failure.kind().retryable());
    }

    #[tokio::test]
    async fn test_handler_invalid_input_is_argument_error() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("picky", "refuses", Schema::object()),
                |_args: ValidatedArguments, _ctx: CallContext| async move {
                    Err::<Value, _>(HandlerError::invalid_input("division by zero"))
                },
            )
            .unwrap();
        let engine = engine_with(registry, Duration::from_secs(5));

        let result = engine.dispatch(CallRequest::new("picky", Value::Null)).await;
        assert_eq!(
            result.failure().unwrap(),
            &Failure::InvalidArguments(ArgumentError::Handler("division by zero".into()))
        );
    }

    #[tokio::test]
    async fn test_long_handler_messages_are_capped() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("chatty", "long error", Schema::object()),
                |_args: ValidatedArguments, _ctx: CallContext| async move {
                    Err::<Value, _>(HandlerError::failed("x".repeat(2000)))
                },
            )
            .unwrap();
        let engine = engine_with(registry, Duration::from_secs(5));

        let result = engine.dispatch(CallRequest::new("chatty", Value::Null)).await;
        let message = result.failure().unwrap().message();
        assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_CHARS);
        assert!(message.ends_with("..."));
    }

    #[tokio::test]
    async fn test_handler_security_errors_hide_roots() {
        let dir = tempfile::tempdir().unwrap();
        let guard = Arc::new(PathGuard::new([dir.path()], Vec::<String>::new()));
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("escape", "resolves outside the root", Schema::object()),
                |_args: ValidatedArguments, ctx: CallContext| async move {
                    let root = ctx.guard().roots()[0].clone();
                    let raw = root.join("..").join("elsewhere.txt");
                    ctx.write_file(&raw.to_string_lossy())?;
                    Ok::<Value, HandlerError>(Value::Null)
                },
            )
            .unwrap();
        let engine = DispatchEngine::new(
            Arc::new(registry),
            guard.clone(),
            Arc::new(RateLimiter::default()),
            Duration::from_secs(5),
        );

        let result = engine.dispatch(CallRequest::new("escape", Value::Null)).await;
        let failure = result.failure().unwrap();
        assert_eq!(failure.subtype(), Some("PathTraversal"));
        let message = failure.message();
        let root = guard.roots()[0].to_string_lossy().into_owned();
        assert!(!message.contains(&root), "{message}");
        assert!(message.contains("<root>"), "{message}");
    }

    #[tokio::test]
    async fn test_network_tools_are_keyed_by_host() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("fetch", "fetch", Schema::object().required("url", Schema::string()))
                    .side_effect(SideEffectClass::Network)
                    .url_field("url"),
                echo,
            )
            .unwrap();
        let engine = engine_with(registry, Duration::from_secs(5));

        for _ in 0..2 {
            let r = engine.dispatch(CallRequest::new("fetch", json!({"url": "https://A.example.com/x"}))).await;
            assert!(r.is_success());
        }
        let third = engine.dispatch(CallRequest::new("fetch", json!({"url": "https://a.example.com/y"}))).await;
        match third.failure() {
            Some(Failure::RateLimited { key, retry_after }) => {
                assert_eq!(key, "host:a.example.com");
                assert!(*retry_after > Duration::ZERO);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        // A different host has its own window.
        let other = engine.dispatch(CallRequest::new("fetch", json!({"url": "https://b.example.com"}))).await;
        assert!(other.is_success());

        // Unparseable URLs fall back to the tool key.
        assert_eq!(
            engine.rate_key(
                engine.registry().lookup("fetch").unwrap().descriptor(),
                &validate(&Schema::object(), &json!({"url": "not a url"})).unwrap()
            ),
            "tool:fetch"
        );
    }

    #[tokio::test]
    async fn test_path_fields_are_guarded_without_roots() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("read", "read", Schema::object().required("path", Schema::string()))
                    .side_effect(SideEffectClass::FilesystemRead)
                    .path_field("path", AccessMode::Read, PathKind::File),
                echo,
            )
            .unwrap();
        let engine = engine_with(registry, Duration::from_secs(5));

        let result = engine.dispatch(CallRequest::new("read", json!({"path": "/etc/passwd"}))).await;
        let failure = result.failure().unwrap();
        assert_eq!(failure.subtype(), Some("PathTraversal"));
        assert_eq!(failure.field(), Some("path"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_rejections_are_logged_in_call_span() {
        let engine = engine_with(ToolRegistry::new(), Duration::from_secs(5));

        let result = engine.dispatch(CallRequest::new("ghost", json!({}))).await;
        assert!(!result.is_success());
        assert!(logs_contain("call failed"));
        assert!(logs_contain("tool=ghost"));
        assert!(logs_contain("UnknownTool"));
    }
}
