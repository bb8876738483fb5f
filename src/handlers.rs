//! Stock [`Handler`] implementations.
//!
//! `echo` is the one method both ends of a connection conventionally
//! expose, regardless of what the application built on top of this
//! transport actually does; `Server` layers `broadcast` on top of
//! whatever a [`Handler`] supplies (see `crate::server`).

use serde_json::Value;

use crate::codec::Params;
use crate::dispatcher::{Dispatcher, Handler, MethodError};

/// Exposes only `echo`, returning its single argument unchanged.
#[derive(Debug, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn build_dispatcher(&self) -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.expose("echo", Box::new(|params| Box::pin(async move { echo(params) })));
        dispatcher
    }
}

fn echo(params: Option<Params>) -> Result<Value, MethodError> {
    match params {
        Some(Params::Positional(mut values)) if values.len() == 1 => Ok(values.remove(0)),
        Some(Params::Named(map)) if map.len() == 1 => {
            Ok(map.into_iter().next().map(|(_, v)| v).unwrap())
        }
        _ => Err(MethodError::InvalidParams),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Outcome, Request};
    use serde_json::json;

    #[tokio::test]
    async fn echo_returns_its_single_positional_argument() {
        let dispatcher = EchoHandler.build_dispatcher();
        let response = dispatcher
            .dispatch(Request {
                id: 1,
                method: "echo".to_string(),
                params: Some(Params::Positional(vec![json!("hi")])),
            })
            .await;
        assert_eq!(response.outcome, Outcome::Result(json!("hi")));
    }

    #[tokio::test]
    async fn echo_rejects_zero_or_many_arguments() {
        let dispatcher = EchoHandler.build_dispatcher();
        let response = dispatcher
            .dispatch(Request {
                id: 2,
                method: "echo".to_string(),
                params: None,
            })
            .await;
        match response.outcome {
            Outcome::Error(fault) => {
                assert_eq!(fault.code, crate::codec::fault_code::INVALID_PARAMS)
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
