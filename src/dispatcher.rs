//! Method resolution and argument binding.
//!
//! A [`Dispatcher`] is an explicit, per-session table of exposed methods
//! built at session-construction time — not a reflective registry walked
//! by attribute. [`Handler`] implementations build one fresh `Dispatcher`
//! per session so that session-scoped closures (e.g. a server's broadcast
//! method, which needs to know which session it must not echo back to)
//! can be captured directly.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::codec::{Fault, Outcome, Params, Request, Response};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The outcome a method implementation reports back to the dispatcher.
/// `InvalidParams` and `Internal` map to distinct wire faults: the caller
/// gets `-32602` for a shape it got wrong, `-32500` (with details only in
/// the log) for anything else the handler raised.
#[derive(Debug)]
pub enum MethodError {
    InvalidParams,
    Internal(anyhow::Error),
}

impl<E> From<E> for MethodError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        MethodError::Internal(err.into())
    }
}

pub type MethodHandler =
    Box<dyn Fn(Option<Params>) -> BoxFuture<'static, Result<Value, MethodError>> + Send + Sync>;

/// A per-session table mapping method names to their implementations.
#[derive(Default)]
pub struct Dispatcher {
    methods: HashMap<&'static str, MethodHandler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    pub fn expose(&mut self, name: &'static str, handler: MethodHandler) {
        self.methods.insert(name, handler);
    }

    pub fn is_exposed(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Resolves and invokes `request.method`, converting whatever the
    /// handler returns into a wire-ready [`Response`]. Never panics: an
    /// unresolved method becomes `-32601`, a bad argument shape becomes
    /// `-32602`, and any other handler failure is logged in full and
    /// reported to the caller as `-32500` with no identifying detail.
    pub async fn dispatch(&self, request: Request) -> Response {
        let Request { id, method, params } = request;

        let Some(handler) = self.methods.get(method.as_str()) else {
            return Response {
                id: Some(id),
                outcome: Outcome::Error(Fault::method_not_found()),
            };
        };

        let outcome = match handler(params).await {
            Ok(value) => Outcome::Result(value),
            Err(MethodError::InvalidParams) => Outcome::Error(Fault::invalid_params()),
            Err(MethodError::Internal(err)) => {
                tracing::error!(method = %method, error = %err, "RPC handler raised an error");
                Outcome::Error(Fault::internal_error())
            }
        };

        Response {
            id: Some(id),
            outcome,
        }
    }
}

/// Builds the method table a session should serve. Implementors typically
/// wrap application state behind `Arc` so the returned closures can share
/// it with the rest of the program.
pub trait Handler: Send + Sync + 'static {
    fn build_dispatcher(&self) -> Dispatcher;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.expose(
            "double",
            Box::new(|params| {
                Box::pin(async move {
                    match params {
                        Some(Params::Positional(values)) if values.len() == 1 => {
                            let n = values[0].as_i64().ok_or(MethodError::InvalidParams)?;
                            Ok(json!(n * 2))
                        }
                        _ => Err(MethodError::InvalidParams),
                    }
                })
            }),
        );
        dispatcher.expose(
            "boom",
            Box::new(|_params| {
                Box::pin(async move {
                    Err(MethodError::Internal(anyhow::anyhow!("kaboom")))
                })
            }),
        );
        dispatcher
    }

    #[tokio::test]
    async fn dispatches_to_a_registered_method() {
        let dispatcher = make_dispatcher();
        let request = Request {
            id: 1,
            method: "double".to_string(),
            params: Some(Params::Positional(vec![json!(21)])),
        };
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.id, Some(1));
        assert_eq!(response.outcome, Outcome::Result(json!(42)));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dispatcher = make_dispatcher();
        let request = Request {
            id: 2,
            method: "missing".to_string(),
            params: None,
        };
        let response = dispatcher.dispatch(request).await;
        match response.outcome {
            Outcome::Error(fault) => assert_eq!(fault.code, crate::codec::fault_code::METHOD_NOT_FOUND),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_shaped_params_is_invalid_params() {
        let dispatcher = make_dispatcher();
        let request = Request {
            id: 3,
            method: "double".to_string(),
            params: None,
        };
        let response = dispatcher.dispatch(request).await;
        match response.outcome {
            Outcome::Error(fault) => assert_eq!(fault.code, crate::codec::fault_code::INVALID_PARAMS),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn internal_handler_error_is_server_error_and_hides_detail() {
        let dispatcher = make_dispatcher();
        let request = Request {
            id: 4,
            method: "boom".to_string(),
            params: None,
        };
        let response = dispatcher.dispatch(request).await;
        match response.outcome {
            Outcome::Error(fault) => {
                assert_eq!(fault.code, crate::codec::fault_code::SERVER_ERROR);
                assert!(!fault.message.contains("kaboom"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
