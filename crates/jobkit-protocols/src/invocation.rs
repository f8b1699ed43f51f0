//! The opaque payload a job engine persists and re-invokes.

use serde::{Deserialize, Serialize};

use crate::context::{attach, recover, ExecutionContext};
use crate::error::DispatchError;
use crate::job::{Job, JobKind};

/// One stored argument of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InvocationArg {
    /// The serialized job value.
    Job(serde_json::Value),
    /// The propagated execution context.
    Context(ExecutionContext),
    /// Any other argument.
    Value(serde_json::Value),
}

/// A persisted unit of work: job type identity plus its stored arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub job_type: String,
    pub kind: JobKind,
    pub display_name: String,
    #[serde(default)]
    pub args: Vec<InvocationArg>,
}

impl Invocation {
    /// Create an invocation without arguments.
    pub fn new(job_type: impl Into<String>, kind: JobKind, display_name: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            kind,
            display_name: display_name.into(),
            args: Vec::new(),
        }
    }

    /// Build the invocation for a job value and its context.
    pub fn for_job<J: Job>(
        job: &J,
        kind: JobKind,
        display_name: impl Into<String>,
        context: ExecutionContext,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_value(job)?;
        Ok(Self::new(J::JOB_TYPE, kind, display_name)
            .with_arg(InvocationArg::Job(payload))
            .with_context(context))
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: InvocationArg) -> Self {
        self.args.push(arg);
        self
    }

    /// Attach (or replace) the execution context.
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.args = attach(std::mem::take(&mut self.args), context);
        self
    }

    /// Recover the execution context, if one was stored.
    pub fn context(&self) -> Option<ExecutionContext> {
        recover(&self.args)
    }

    /// The serialized job value, if present.
    pub fn job_payload(&self) -> Option<&serde_json::Value> {
        self.args.iter().find_map(|arg| match arg {
            InvocationArg::Job(value) => Some(value),
            _ => None,
        })
    }

    /// Decode the job value into its concrete type.
    pub fn decode_job<J: Job>(&self) -> Result<J, DispatchError> {
        let payload = self.job_payload().ok_or_else(|| DispatchError::InvalidPayload {
            job_type: self.job_type.clone(),
            message: "invocation carries no job argument".to_string(),
        })?;
        serde_json::from_value(payload.clone()).map_err(|e| DispatchError::InvalidPayload {
            job_type: self.job_type.clone(),
            message: e.to_string(),
        })
    }

    /// Arguments other than the context, rendered for log output.
    pub fn display_args(&self) -> String {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                InvocationArg::Job(value) | InvocationArg::Value(value) => Some(value.to_string()),
                InvocationArg::Context(_) => None,
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
