//! Job filter trait.

use async_trait::async_trait;

use super::context::{
    ApplyStateContext, CreatedContext, CreatingContext, ElectStateContext, PerformedContext,
    PerformingContext,
};
use crate::error::FilterError;

/// Lifecycle observer invoked around job creation, execution and state changes.
///
/// Filters run in ascending `execution_order()`; performed-hooks run in the
/// exact reverse. Negative orders are reserved for built-in filters.
#[async_trait]
pub trait JobFilter: Send + Sync {
    /// Filter name used in logs and errors.
    fn name(&self) -> &str;

    /// Lower values run earlier. Default is 0.
    fn execution_order(&self) -> i32 {
        0
    }

    async fn on_creating(&self, _ctx: &mut CreatingContext) -> Result<(), FilterError> {
        Ok(())
    }

    async fn on_created(&self, _ctx: &CreatedContext<'_>) -> Result<(), FilterError> {
        Ok(())
    }

    /// An error stops the remaining before-hooks and the handler.
    async fn on_performing(&self, _ctx: &PerformingContext<'_>) -> Result<(), FilterError> {
        Ok(())
    }

    async fn on_performed(&self, _ctx: &PerformedContext<'_>) -> Result<(), FilterError> {
        Ok(())
    }

    async fn on_state_election(&self, _ctx: &mut ElectStateContext<'_>) -> Result<(), FilterError> {
        Ok(())
    }

    async fn on_state_applied(&self, _ctx: &ApplyStateContext<'_>) -> Result<(), FilterError> {
        Ok(())
    }

    async fn on_state_unapplied(&self, _ctx: &ApplyStateContext<'_>) -> Result<(), FilterError> {
        Ok(())
    }
}
