//! Command type to handler mapping
//!
//! Each handler declares its payload type; the payload is decoded before a
//! job is started, so a malformed payload never occupies the job slot.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use fleetman_api::Command;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::AgentError;

/// Future of a prepared command
pub type JobFuture = BoxFuture<'static, Result<(), AgentError>>;

type Prepare = Arc<dyn Fn(serde_json::Value) -> Result<JobFuture, serde_json::Error> + Send + Sync>;

/// Why a command could not be turned into a job
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no handler for command type {0}")]
    Unknown(String),

    #[error("invalid payload for {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Registered handlers, keyed by command type
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Prepare>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`
    ///
    /// # Errors
    /// Returns `AgentError::EmptyKind` or `AgentError::DuplicateHandler`
    pub fn register<P, F, Fut>(&mut self, kind: &str, handler: F) -> Result<(), AgentError>
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(AgentError::EmptyKind);
        }
        if self.handlers.contains_key(kind) {
            return Err(AgentError::DuplicateHandler(kind.to_string()));
        }

        let prepare: Prepare = Arc::new(
            move |data: serde_json::Value| -> Result<JobFuture, serde_json::Error> {
                let payload: P = serde_json::from_value(data)?;
                Ok(Box::pin(handler(payload)))
            },
        );
        self.handlers.insert(kind.to_string(), prepare);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered types, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Decode the command payload and bind it to its handler
    ///
    /// A missing `data` field decodes as an empty object.
    ///
    /// # Errors
    /// Returns `DispatchError::Unknown` for unmapped types and
    /// `DispatchError::Decode` for payloads the handler cannot accept
    pub fn prepare(&self, command: &Command) -> Result<JobFuture, DispatchError> {
        let prepare = self
            .handlers
            .get(&command.kind)
            .ok_or_else(|| DispatchError::Unknown(command.kind.clone()))?;

        let data = match &command.data {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        prepare(data).map_err(|source| DispatchError::Decode {
            kind: command.kind.clone(),
            source,
        })
    }
}
