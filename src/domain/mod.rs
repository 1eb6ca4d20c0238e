pub mod models;
pub mod types;

pub use models::{DailyCounter, NewVisitEvent, PageCount, ReferrerCount, Totals, VisitEvent};
pub use types::{EventId, VisitorId};
