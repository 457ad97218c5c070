//! Weekly presence recording and the weekly fill sheet

use chrono::Datelike;
use rollcall_api::{
    Batch, CallerContext, FillSheet, HourSlots, SheetRow, WeekRecorded, WeekSubmission,
};
use rollcall_store::{AuditEventType, StoreError};
use rollcall_util::{month_name, months_in_range, resolve_month_in_range, BatchId, LineId, StudentId};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::{recompute, AttendanceEngine, EngineError, EngineResult};

/// Resolve a submitted (month name, week) against the batch's month range
fn resolve_week(batch: &Batch, month: &str, week: u32) -> EngineResult<u32> {
    if week == 0 {
        return Err(EngineError::InvalidWeekOrMonth(
            "week numbers start at 1".into(),
        ));
    }
    resolve_month_in_range(month, batch.start_month, batch.end_month).ok_or_else(|| {
        EngineError::InvalidWeekOrMonth(format!(
            "'{}' is not a month between {} and {}",
            month,
            batch.start_month.format("%B %Y"),
            batch.end_month.format("%B %Y")
        ))
    })
}

impl AttendanceEngine {
    /// Record one week of presence for every line of a batch.
    ///
    /// Students of the batch missing from the submission are recorded absent
    /// for all three hours. Re-submitting a week overwrites it. The store
    /// enumerates the batch's lines, writes their weekly rows and recomputes
    /// their totals in one transaction.
    pub fn record_week(
        &self,
        caller: &CallerContext,
        batch_id: &BatchId,
        submission: &WeekSubmission,
    ) -> EngineResult<WeekRecorded> {
        let batch = self.load_batch(batch_id)?;
        self.require_batch_writer(caller, &batch, "record_week")?;
        let month = resolve_week(&batch, &submission.month, submission.week)?;

        // Lines are only ever added to a live batch, so a student with a
        // line now still has one when the store writes the week
        let enrolled: HashSet<StudentId> = self
            .store
            .batch_lines(&batch.id)?
            .iter()
            .map(|l| l.student_id)
            .collect();
        if let Some(stranger) = submission
            .presence
            .iter()
            .find(|p| !enrolled.contains(&p.student_id))
        {
            return Err(EngineError::UnknownStudent(stranger.student_id));
        }

        let presence: Vec<(StudentId, HourSlots)> = submission
            .presence
            .iter()
            .map(|p| (p.student_id, p.slots))
            .collect();

        let threshold = self.threshold();
        let totals = match self.store.record_week(
            &batch.id,
            month,
            submission.week,
            &presence,
            &|details| recompute(details, threshold),
        ) {
            Ok(totals) => totals,
            Err(StoreError::NotFound(what)) => return Err(EngineError::NotFound(what)),
            Err(e) => return Err(e.into()),
        };

        let not_allowed = totals
            .iter()
            .filter(|(_, t)| !t.final_status.is_allowed())
            .count();

        self.audit(AuditEventType::WeekRecorded {
            batch_id: batch.id,
            month,
            week: submission.week,
            lines: totals.len(),
        });
        info!(
            batch_id = %batch.id,
            month,
            week = submission.week,
            lines = totals.len(),
            not_allowed,
            "Week recorded"
        );

        Ok(WeekRecorded {
            batch_id: batch.id,
            month,
            week: submission.week,
            lines_updated: totals.len(),
            not_allowed,
        })
    }

    /// The weekly roster of a batch for one (month, week), defaulting to the
    /// batch's first month and week 1
    pub fn fill_sheet(
        &self,
        caller: &CallerContext,
        batch_id: &BatchId,
        month: Option<&str>,
        week: Option<u32>,
    ) -> EngineResult<FillSheet> {
        let batch = self.load_batch(batch_id)?;
        self.require_batch_reader(caller, &batch, "fill_sheet")?;

        let months: Vec<String> = months_in_range(batch.start_month, batch.end_month)
            .iter()
            .filter_map(|m| month_name(m.month()))
            .map(str::to_string)
            .collect();

        let selected_month = match month {
            Some(name) => name.to_string(),
            None => months.first().cloned().ok_or_else(|| {
                EngineError::InvalidWeekOrMonth("batch covers no months".into())
            })?,
        };
        let selected_week = week.unwrap_or(1);
        let month_number = resolve_week(&batch, &selected_month, selected_week)?;
        let selected_month = month_name(month_number)
            .map(str::to_string)
            .unwrap_or(selected_month);

        let recorded: HashMap<LineId, HourSlots> = self
            .store
            .week_details(&batch.id, month_number, selected_week)?
            .into_iter()
            .map(|d| (d.line_id, d.slots))
            .collect();

        let mut rows = Vec::new();
        for line in self.store.batch_lines(&batch.id)? {
            let student_name = self
                .store
                .get_student(line.student_id)?
                .map(|s| s.full_name())
                .unwrap_or_default();
            rows.push(SheetRow {
                line_id: line.id,
                student_id: line.student_id,
                student_name,
                slots: recorded.get(&line.id).copied(),
                cumulative: line.totals.final_status,
            });
        }
        rows.sort_by(|a, b| {
            a.student_name
                .cmp(&b.student_name)
                .then(a.line_id.cmp(&b.line_id))
        });

        Ok(FillSheet {
            batch: self.batch_view(&batch)?,
            months,
            selected_month,
            selected_week,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::*;
    use crate::*;
    use rollcall_api::{
        CallerContext, FinalStatus, HourSlots, StudentPresence, WeekSubmission,
    };
    use rollcall_util::{BatchId, StudentId, TeacherId};

    fn present(student: i64, h1: bool, h2: bool, h3: bool) -> StudentPresence {
        StudentPresence {
            student_id: StudentId::new(student),
            slots: HourSlots::new(h1, h2, h3),
        }
    }

    fn submission(month: &str, week: u32, presence: Vec<StudentPresence>) -> WeekSubmission {
        WeekSubmission {
            month: month.into(),
            week,
            presence,
        }
    }

    #[test]
    fn test_missing_students_recorded_absent() {
        let engine = engine_with(&[(1, "Asha"), (2, "Bilal")]);
        let batch = engine.open_batch(&admin(), &spec(10, 1)).unwrap().batch_id;

        let recorded = engine
            .record_week(
                &admin(),
                &batch,
                &submission("February", 1, vec![present(1, true, true, true)]),
            )
            .unwrap();
        assert_eq!(recorded.month, 2);
        assert_eq!(recorded.lines_updated, 2);

        let lines = engine.store.batch_lines(&batch).unwrap();
        let bilal = lines.iter().find(|l| l.student_id == StudentId::new(2)).unwrap();
        assert_eq!(bilal.totals.hours_absent, 3);
        assert_eq!(bilal.totals.hours_present, 0);

        let details = engine.store.line_details(bilal.id).unwrap();
        assert_eq!(details[0].slots, HourSlots::ABSENT);
    }

    #[test]
    fn test_resubmission_overwrites() {
        let engine = engine_with(&[(1, "Asha")]);
        let batch = engine.open_batch(&admin(), &spec(10, 1)).unwrap().batch_id;
        let week = submission("march", 2, vec![present(1, true, false, false)]);

        engine.record_week(&admin(), &batch, &week).unwrap();
        let once = engine.store.batch_lines(&batch).unwrap()[0].totals;
        engine.record_week(&admin(), &batch, &week).unwrap();
        let twice = engine.store.batch_lines(&batch).unwrap();

        assert_eq!(twice[0].totals, once);
        assert_eq!(engine.store.line_details(twice[0].id).unwrap().len(), 1);

        // Last write wins, no merge
        engine
            .record_week(
                &admin(),
                &batch,
                &submission("March", 2, vec![present(1, false, false, true)]),
            )
            .unwrap();
        let details = engine.store.line_details(twice[0].id).unwrap();
        assert_eq!(details[0].slots, HourSlots::new(false, false, true));
    }

    #[test]
    fn test_status_flips_after_enough_absence() {
        let engine = engine_with(&[(1, "Asha")]);
        let batch = engine.open_batch(&admin(), &spec(10, 1)).unwrap().batch_id;

        for week in 1..=4 {
            let recorded = engine
                .record_week(&admin(), &batch, &submission("February", week, vec![]))
                .unwrap();
            assert_eq!(recorded.not_allowed, 0);
        }

        // 13 absent hours
        let recorded = engine
            .record_week(
                &admin(),
                &batch,
                &submission("March", 1, vec![present(1, true, true, false)]),
            )
            .unwrap();
        assert_eq!(recorded.not_allowed, 1);

        let line = &engine.store.batch_lines(&batch).unwrap()[0];
        assert_eq!(line.totals.hours_absent, 13);
        assert_eq!(line.totals.final_status, FinalStatus::NotAllowed);
    }

    #[test]
    fn test_invalid_month_and_week() {
        let engine = engine_with(&[(1, "Asha")]);
        let batch = engine.open_batch(&admin(), &spec(10, 1)).unwrap().batch_id;

        for bad in [
            submission("June", 1, vec![]),
            submission("Smarch", 1, vec![]),
            submission("March", 0, vec![]),
        ] {
            let result = engine.record_week(&admin(), &batch, &bad);
            assert!(matches!(result, Err(EngineError::InvalidWeekOrMonth(_))));
        }

        // Weeks have no upper bound
        engine
            .record_week(&admin(), &batch, &submission("April", 7, vec![]))
            .unwrap();
    }

    #[test]
    fn test_unknown_student_rejects_whole_submission() {
        let engine = engine_with(&[(1, "Asha")]);
        let batch = engine.open_batch(&admin(), &spec(10, 1)).unwrap().batch_id;

        let result = engine.record_week(
            &admin(),
            &batch,
            &submission("March", 1, vec![present(1, true, true, true), present(9, true, true, true)]),
        );
        assert!(matches!(result, Err(EngineError::UnknownStudent(s)) if s == StudentId::new(9)));

        let line = &engine.store.batch_lines(&batch).unwrap()[0];
        assert!(engine.store.line_details(line.id).unwrap().is_empty());
    }

    #[test]
    fn test_record_week_access() {
        let engine = engine_with(&[(1, "Asha")]);
        let batch = engine.open_batch(&admin(), &spec(10, 1)).unwrap().batch_id;
        let week = submission("March", 1, vec![]);

        let own = CallerContext::teacher(11, TeacherId::new(1));
        engine.record_week(&own, &batch, &week).unwrap();

        let other = CallerContext::teacher(12, TeacherId::new(2));
        let result = engine.record_week(&other, &batch, &week);
        assert!(matches!(result, Err(EngineError::AccessDenied(_))));

        let student = CallerContext::student(13, StudentId::new(1));
        let result = engine.record_week(&student, &batch, &week);
        assert!(matches!(result, Err(EngineError::AccessDenied(_))));

        let result = engine.record_week(&admin(), &BatchId::new(), &week);
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_fill_sheet() {
        let engine = engine_with(&[(1, "Zara"), (2, "Bilal")]);
        let batch = engine.open_batch(&admin(), &spec(10, 1)).unwrap().batch_id;

        let sheet = engine.fill_sheet(&admin(), &batch, None, None).unwrap();
        assert_eq!(sheet.months, vec!["February", "March", "April"]);
        assert_eq!(sheet.selected_month, "February");
        assert_eq!(sheet.selected_week, 1);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].student_name, "Bilal Test");
        assert!(sheet.rows.iter().all(|r| r.slots.is_none()));

        engine
            .record_week(
                &admin(),
                &batch,
                &submission("March", 3, vec![present(1, true, false, true)]),
            )
            .unwrap();

        let sheet = engine
            .fill_sheet(&CallerContext::teacher(11, TeacherId::new(1)), &batch, Some("mar"), Some(3))
            .unwrap();
        assert_eq!(sheet.selected_month, "March");
        let zara = sheet.rows.iter().find(|r| r.student_id == StudentId::new(1)).unwrap();
        assert_eq!(zara.slots, Some(HourSlots::new(true, false, true)));
        assert_eq!(zara.cumulative, FinalStatus::Allowed);

        let result = engine.fill_sheet(&CallerContext::student(13, StudentId::new(1)), &batch, None, None);
        assert!(matches!(result, Err(EngineError::AccessDenied(_))));

        let result = engine.fill_sheet(&admin(), &batch, Some("May"), None);
        assert!(matches!(result, Err(EngineError::InvalidWeekOrMonth(_))));
    }
}
