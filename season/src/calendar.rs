//! Calendar units of auto-renewing periods and their identifiers.
//!
//! Ids encode the type and the calendar range: `weekly_2026_W42` (ISO
//! week), `monthly_2026_10`, `quarterly_2026_Q4`.

use chrono::{Datelike, Days, Months, NaiveDate};
use gamify_types::{CompetitionPeriod, PeriodId, PeriodType, ValidationError};

/// First and last day of the calendar unit of `period_type` containing
/// `day`. `Custom` periods have no calendar unit.
pub fn calendar_span(period_type: PeriodType, day: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = match period_type {
        PeriodType::Weekly => {
            day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_monday())))?
        }
        PeriodType::Monthly => NaiveDate::from_ymd_opt(day.year(), day.month(), 1)?,
        PeriodType::Quarterly => {
            let first_month = (day.month0() / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(day.year(), first_month, 1)?
        }
        PeriodType::Custom => return None,
    };
    let end = match period_type {
        PeriodType::Weekly => start.checked_add_days(Days::new(6))?,
        PeriodType::Monthly => start.checked_add_months(Months::new(1))?.pred_opt()?,
        PeriodType::Quarterly => start.checked_add_months(Months::new(3))?.pred_opt()?,
        PeriodType::Custom => return None,
    };
    Some((start, end))
}

/// Identifier of the calendar unit starting at `start`.
pub fn period_id_for(period_type: PeriodType, start: NaiveDate) -> Option<PeriodId> {
    let id = match period_type {
        PeriodType::Weekly => {
            let week = start.iso_week();
            format!("weekly_{}_W{:02}", week.year(), week.week())
        }
        PeriodType::Monthly => format!("monthly_{}_{:02}", start.year(), start.month()),
        PeriodType::Quarterly => {
            format!("quarterly_{}_Q{}", start.year(), start.month0() / 3 + 1)
        }
        PeriodType::Custom => return None,
    };
    Some(PeriodId::new(id))
}

/// The period following `period`: same type, starting the day after its
/// end. `None` for types that do not renew.
pub fn successor(period: &CompetitionPeriod) -> Result<Option<CompetitionPeriod>, ValidationError> {
    if !period.period_type.auto_renews() {
        return Ok(None);
    }
    let Some(next_day) = period.end_date.succ_opt() else {
        return Ok(None);
    };
    let Some((start, end)) = calendar_span(period.period_type, next_day) else {
        return Ok(None);
    };
    let Some(id) = period_id_for(period.period_type, start) else {
        return Ok(None);
    };
    let mut next = CompetitionPeriod::new(id, period.period_type, start, end)?;
    next.predecessor = Some(period.period_id.clone());
    Ok(Some(next))
}
