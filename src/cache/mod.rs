//! Local read-through cache the dashboard renders from.
//!
//! Sync operations write a feature's records after talking to the backend;
//! the dashboard only ever reads. Writes announce themselves on the
//! [`EventBus`](crate::event::EventBus) so open views can reload.

mod layer;
mod records;
mod traits;

pub use layer::{DashboardCache, TASK_CATEGORIES_KEY};
pub use records::{
  ExpenseSummary, MonthlyBudget, ScheduleEntry, TaskSummary, DEFAULT_MONTHLY_BUDGET,
  MAX_CACHED_EXPENSES,
};
pub use traits::{Cacheable, Feature, MergeKey};
