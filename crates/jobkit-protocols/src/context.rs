//! Correlation context propagated with every job invocation.
//!
//! The context travels as one of the invocation's stored arguments, so it
//! survives the engine's persistence and can be recovered by any hook, in any
//! process, from deserialized data alone.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::invocation::InvocationArg;

/// Correlation id plus free-form headers attached to a job invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ContextRepr")]
pub struct ExecutionContext {
    correlation_id: String,
    headers: HashMap<String, String>,
}

/// Wire shape; empty correlation ids are replaced on the way in.
#[derive(Deserialize)]
struct ContextRepr {
    #[serde(default)]
    correlation_id: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl From<ContextRepr> for ExecutionContext {
    fn from(repr: ContextRepr) -> Self {
        Self::with_correlation_id(repr.correlation_id).with_headers(repr.headers)
    }
}

impl ExecutionContext {
    /// Create a context with a freshly generated correlation id.
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            headers: HashMap::new(),
        }
    }

    /// Create a context with the given correlation id.
    ///
    /// An empty id is replaced by a generated one.
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        if correlation_id.trim().is_empty() {
            return Self::new();
        }
        Self {
            correlation_id,
            headers: HashMap::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Merge a set of headers.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Store `context` as one of the invocation arguments.
///
/// Any context already present is replaced, so an invocation carries at most one.
pub fn attach(mut args: Vec<InvocationArg>, context: ExecutionContext) -> Vec<InvocationArg> {
    args.retain(|arg| !matches!(arg, InvocationArg::Context(_)));
    args.push(InvocationArg::Context(context));
    args
}

/// Recover the context from stored invocation arguments.
///
/// Returns `None` for invocations submitted without one.
pub fn recover(args: &[InvocationArg]) -> Option<ExecutionContext> {
    args.iter().find_map(|arg| match arg {
        InvocationArg::Context(context) => Some(context.clone()),
        _ => None,
    })
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
