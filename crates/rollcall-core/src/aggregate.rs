//! Status aggregation
//!
//! A line's totals are a pure function of its weekly details. The store
//! calls [`recompute`] inside the same transaction that writes the details.

use rollcall_api::{CallerContext, FinalStatus, LineTotals, WeeklyDetail, HOURS_PER_WEEK};
use rollcall_store::AuditEventType;
use rollcall_util::LineId;
use tracing::info;

use crate::{AttendanceEngine, EngineError, EngineResult};

/// Cumulative totals and verdict for one line's weekly details
pub fn recompute(details: &[WeeklyDetail], threshold_hours: u32) -> LineTotals {
    let hours_present: u32 = details.iter().map(|d| d.slots.present_count()).sum();
    let total_slots = HOURS_PER_WEEK * details.len() as u32;
    let hours_absent = total_slots - hours_present;

    LineTotals {
        hours_present,
        hours_absent,
        final_status: FinalStatus::from_absence(hours_absent, threshold_hours),
    }
}

impl AttendanceEngine {
    /// Re-derive the totals of one line from its weekly details
    pub fn recompute_line(
        &self,
        caller: &CallerContext,
        line_id: LineId,
    ) -> EngineResult<LineTotals> {
        self.require_admin(caller, "recompute_line")?;

        if self.store.get_line(line_id)?.is_none() {
            return Err(EngineError::NotFound(format!("attendance line {}", line_id)));
        }

        let threshold = self.threshold();
        let results = self
            .store
            .recompute_lines(&[line_id], &|details| recompute(details, threshold))?;

        self.audit(AuditEventType::LinesRecomputed { lines: results.len() });

        results
            .into_iter()
            .next()
            .map(|(_, totals)| totals)
            .ok_or_else(|| EngineError::NotFound(format!("attendance line {}", line_id)))
    }

    /// Re-derive the totals of every line. Safe to run at any time.
    pub fn recompute_all(&self, caller: &CallerContext) -> EngineResult<usize> {
        self.require_admin(caller, "recompute_all")?;

        let lines = self.store.all_line_ids()?;
        let threshold = self.threshold();
        let results = self
            .store
            .recompute_lines(&lines, &|details| recompute(details, threshold))?;

        self.audit(AuditEventType::LinesRecomputed { lines: results.len() });
        info!(lines = results.len(), threshold, "All lines recomputed");

        Ok(results.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_api::HourSlots;

    fn week(h1: bool, h2: bool, h3: bool) -> WeeklyDetail {
        WeeklyDetail {
            line_id: LineId::new(1),
            month: 3,
            week: 1,
            slots: HourSlots::new(h1, h2, h3),
        }
    }

    #[test]
    fn no_details_is_allowed() {
        assert_eq!(recompute(&[], 12), LineTotals::default());
    }

    #[test]
    fn two_weeks() {
        let details = [week(true, true, false), week(false, false, false)];
        let totals = recompute(&details, 12);
        assert_eq!(totals.hours_present, 2);
        assert_eq!(totals.hours_absent, 4);
        assert_eq!(totals.final_status, FinalStatus::Allowed);
    }

    #[test]
    fn six_weeks_crosses_threshold() {
        let mut details = vec![week(true, true, false)];
        details.extend(std::iter::repeat(week(false, false, false)).take(5));
        let totals = recompute(&details, 12);
        assert_eq!(totals.hours_present, 2);
        assert_eq!(totals.hours_absent, 16);
        assert_eq!(totals.final_status, FinalStatus::NotAllowed);
    }

    #[test]
    fn boundary() {
        let four_absent = vec![week(false, false, false); 4];
        assert_eq!(recompute(&four_absent, 12).hours_absent, 12);
        assert_eq!(recompute(&four_absent, 12).final_status, FinalStatus::Allowed);

        let mut thirteen = four_absent.clone();
        thirteen.push(week(true, true, false));
        assert_eq!(recompute(&thirteen, 12).hours_absent, 13);
        assert_eq!(recompute(&thirteen, 12).final_status, FinalStatus::NotAllowed);
    }

    #[test]
    fn threshold_is_configurable() {
        let details = vec![week(false, false, false); 2];
        assert_eq!(recompute(&details, 5).final_status, FinalStatus::NotAllowed);
        assert_eq!(recompute(&details, 6).final_status, FinalStatus::Allowed);
    }

    #[test]
    fn deterministic() {
        let details = [week(true, false, true), week(false, true, false)];
        assert_eq!(recompute(&details, 12), recompute(&details, 12));
    }
}
