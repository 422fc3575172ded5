//! Competition periods: calendar arithmetic and the closure job.
//!
//! The closure job keeps no checkpoint. Work it does not finish inside its
//! time budget stays selectable by the next run's scan: periods that are
//! still active past their end date, or still marked `closing`.

pub mod calendar;
pub mod closure;
pub mod error;

pub use calendar::{calendar_span, period_id_for, successor};
pub use closure::{ClosureConfig, ClosureReport, PeriodClosureJob};
pub use error::SeasonError;
