//! Conversion of interpreter faults into [`BridgeError`].

use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};

use super::value::ConversionError;
use crate::BridgeError;

const TRACEBACK_MARKER: &str = "stack traceback:";

/// Convert an interpreter error raised while running `chunk`.
pub fn convert(err: mlua::Error, chunk: &str) -> BridgeError {
    match err {
        mlua::Error::SyntaxError { message, .. } => BridgeError::Compile {
            chunk: chunk.to_string(),
            message,
        },
        mlua::Error::RuntimeError(message) => split_traceback(&message),
        mlua::Error::CallbackError { traceback, cause } => {
            match convert((*cause).clone(), chunk) {
                BridgeError::Runtime {
                    message,
                    traceback: inner,
                } => BridgeError::Runtime {
                    message,
                    traceback: inner.or(Some(traceback)),
                },
                other => other,
            }
        }
        mlua::Error::MemoryError(message) => BridgeError::Runtime {
            message: format!("out of memory: {message}"),
            traceback: None,
        },
        mlua::Error::ExternalError(inner) => {
            if let Some(conversion) = inner.downcast_ref::<ConversionError>() {
                return BridgeError::Conversion(conversion.clone());
            }
            BridgeError::Runtime {
                message: inner.to_string(),
                traceback: None,
            }
        }
        other => split_traceback(&other.to_string()),
    }
}

fn split_traceback(message: &str) -> BridgeError {
    match message.find(TRACEBACK_MARKER) {
        Some(at) => BridgeError::Runtime {
            message: message[..at].trim_end().to_string(),
            traceback: Some(message[at..].to_string()),
        },
        None => BridgeError::Runtime {
            message: message.to_string(),
            traceback: None,
        },
    }
}

/// Run `f`, turning interpreter errors and host panics into [`BridgeError`].
pub fn guard<T>(chunk: &str, f: impl FnOnce() -> mlua::Result<T>) -> crate::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(convert(err, chunk)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(BridgeError::Runtime {
                message: format!("panic in {chunk}: {message}"),
                traceback: Some(Backtrace::force_capture().to_string()),
            })
        }
    }
}
