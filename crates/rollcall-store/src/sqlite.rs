//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use rollcall_api::{
    format_full_name, AttendanceLine, AttendanceLineView, Batch, CohortKey, Course, Enrollment,
    FinalStatus, HourSlots, LineTotals, Student, Teacher, WeeklyDetail,
};
use rollcall_util::{
    AcademicYearId, BatchId, CourseId, DepartmentId, FacultyId, LineId, SemesterId, StudentId,
    TeacherId,
};
use rusqlite::types::{Type, Value};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    AuditEvent, BatchQuery, LineQuery, RecomputeFn, Roster, Store, StoreError, StoreResult,
};

/// Storage format for month and day columns
const DAY_FORMAT: &str = "%Y-%m-%d";

/// How long a write waits on another connection's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const BATCH_COLUMNS: &str = "id, course_id, teacher_id, faculty_id, department_id, \
     academic_year_id, semester_id, start_month, end_month, created_at";

const LINE_COLUMNS: &str =
    "id, batch_id, student_id, created_at, hours_present, hours_absent, final_status";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Directory
            CREATE TABLE IF NOT EXISTS teachers (
                id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                middle_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY,
                roll_id TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                middle_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                credit_hours INTEGER NOT NULL DEFAULT 0,
                faculty_id INTEGER NOT NULL,
                department_id INTEGER NOT NULL,
                semester_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS teacher_courses (
                teacher_id INTEGER NOT NULL REFERENCES teachers(id) ON DELETE CASCADE,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                PRIMARY KEY (teacher_id, course_id)
            );

            CREATE TABLE IF NOT EXISTS enrollments (
                student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                faculty_id INTEGER NOT NULL,
                department_id INTEGER NOT NULL,
                academic_year_id INTEGER NOT NULL,
                semester_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (student_id, faculty_id, department_id, academic_year_id, semester_id)
            );

            -- Batches: one active batch per course per (faculty, department, semester)
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                course_id INTEGER NOT NULL REFERENCES courses(id),
                teacher_id INTEGER NOT NULL REFERENCES teachers(id),
                faculty_id INTEGER NOT NULL,
                department_id INTEGER NOT NULL,
                academic_year_id INTEGER NOT NULL,
                semester_id INTEGER NOT NULL,
                start_month TEXT NOT NULL,
                end_month TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attendance_lines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT NOT NULL REFERENCES batches(id) ON DELETE CASCADE,
                student_id INTEGER NOT NULL REFERENCES students(id),
                created_at TEXT NOT NULL,
                hours_present INTEGER NOT NULL DEFAULT 0,
                hours_absent INTEGER NOT NULL DEFAULT 0,
                final_status TEXT NOT NULL DEFAULT 'allowed',
                UNIQUE (batch_id, student_id)
            );

            CREATE TABLE IF NOT EXISTS weekly_details (
                line_id INTEGER NOT NULL REFERENCES attendance_lines(id) ON DELETE CASCADE,
                month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
                week INTEGER NOT NULL CHECK (week >= 1),
                hour1 INTEGER NOT NULL,
                hour2 INTEGER NOT NULL,
                hour3 INTEGER NOT NULL,
                PRIMARY KEY (line_id, month, week)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_batches_course_cell
                ON batches(faculty_id, department_id, semester_id, course_id);
            CREATE INDEX IF NOT EXISTS idx_batches_teacher ON batches(teacher_id);
            CREATE INDEX IF NOT EXISTS idx_lines_student ON attendance_lines(student_id);
            CREATE INDEX IF NOT EXISTS idx_enrollments_cell
                ON enrollments(faculty_id, department_id, academic_year_id, semester_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

fn day_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DAY_FORMAT)
        .map_err(|e| conversion_error(idx, format!("invalid date '{}': {}", s, e)))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp '{}': {}", s, e)))
}

fn batch_id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<BatchId> {
    let s: String = row.get(idx)?;
    BatchId::parse(&s).ok_or_else(|| conversion_error(idx, format!("invalid batch id '{}'", s)))
}

fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<FinalStatus> {
    let s: String = row.get(idx)?;
    FinalStatus::parse(&s).ok_or_else(|| conversion_error(idx, format!("invalid status '{}'", s)))
}

fn cohort_at(row: &Row<'_>, first: usize) -> rusqlite::Result<CohortKey> {
    Ok(CohortKey {
        faculty_id: FacultyId::new(row.get(first)?),
        department_id: DepartmentId::new(row.get(first + 1)?),
        academic_year_id: AcademicYearId::new(row.get(first + 2)?),
        semester_id: SemesterId::new(row.get(first + 3)?),
    })
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<Batch> {
    Ok(Batch {
        id: batch_id_at(row, 0)?,
        course_id: CourseId::new(row.get(1)?),
        teacher_id: TeacherId::new(row.get(2)?),
        cohort: cohort_at(row, 3)?,
        start_month: day_at(row, 7)?,
        end_month: day_at(row, 8)?,
        created_at: timestamp_at(row, 9)?,
    })
}

fn line_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceLine> {
    Ok(AttendanceLine {
        id: LineId::new(row.get(0)?),
        batch_id: batch_id_at(row, 1)?,
        student_id: StudentId::new(row.get(2)?),
        created_at: timestamp_at(row, 3)?,
        totals: LineTotals {
            hours_present: row.get(4)?,
            hours_absent: row.get(5)?,
            final_status: status_at(row, 6)?,
        },
    })
}

fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<WeeklyDetail> {
    Ok(WeeklyDetail {
        line_id: LineId::new(row.get(0)?),
        month: row.get(1)?,
        week: row.get(2)?,
        slots: HourSlots::new(row.get(3)?, row.get(4)?, row.get(5)?),
    })
}

fn load_line_details(conn: &Connection, line: LineId) -> StoreResult<Vec<WeeklyDetail>> {
    let mut stmt = conn.prepare(
        "SELECT line_id, month, week, hour1, hour2, hour3 FROM weekly_details
         WHERE line_id = ? ORDER BY month, week",
    )?;
    let details = stmt
        .query_map([line.get()], detail_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(details)
}

fn line_ids_of_batch(conn: &Connection, batch: &BatchId) -> StoreResult<Vec<LineId>> {
    let mut stmt = conn.prepare("SELECT id FROM attendance_lines WHERE batch_id = ? ORDER BY id")?;
    let ids = stmt
        .query_map([batch.to_string()], |row| row.get::<_, i64>(0).map(LineId::new))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Re-derive and persist totals for each line using the caller's aggregator
fn recompute_in(
    conn: &Connection,
    lines: &[LineId],
    recompute: RecomputeFn<'_>,
) -> StoreResult<Vec<(LineId, LineTotals)>> {
    let mut results = Vec::with_capacity(lines.len());
    for &line in lines {
        let details = load_line_details(conn, line)?;
        let totals = recompute(&details);
        let changed = conn.execute(
            "UPDATE attendance_lines
             SET hours_present = ?, hours_absent = ?, final_status = ?
             WHERE id = ?",
            params![
                totals.hours_present,
                totals.hours_absent,
                totals.final_status.as_str(),
                line.get()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("attendance line {}", line)));
        }
        results.push((line, totals));
    }
    Ok(results)
}

/// Students enrolled in a cohort cell, ordered by id
fn enrolled_in(conn: &Connection, cohort: &CohortKey) -> StoreResult<Vec<StudentId>> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM enrollments
         WHERE faculty_id = ? AND department_id = ? AND academic_year_id = ? AND semester_id = ?
         ORDER BY student_id",
    )?;
    let students = stmt
        .query_map(
            params![
                cohort.faculty_id.get(),
                cohort.department_id.get(),
                cohort.academic_year_id.get(),
                cohort.semester_id.get()
            ],
            |row| row.get::<_, i64>(0).map(StudentId::new),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

fn batch_exists(conn: &Connection, batch: &BatchId) -> StoreResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM batches WHERE id = ?)",
        [batch.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

impl Roster for SqliteStore {
    fn list_enrolled(&self, cohort: &CohortKey) -> StoreResult<Vec<StudentId>> {
        let conn = self.conn()?;
        enrolled_in(&conn, cohort)
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| rollcall_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn upsert_teacher(&self, teacher: &Teacher) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO teachers (id, first_name, middle_name, last_name)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                middle_name = excluded.middle_name,
                last_name = excluded.last_name
            "#,
            params![
                teacher.id.get(),
                teacher.first_name,
                teacher.middle_name,
                teacher.last_name
            ],
        )?;
        debug!(teacher_id = %teacher.id, "Teacher saved");
        Ok(())
    }

    fn get_teacher(&self, id: TeacherId) -> StoreResult<Option<Teacher>> {
        let conn = self.conn()?;
        let teacher = conn
            .query_row(
                "SELECT id, first_name, middle_name, last_name FROM teachers WHERE id = ?",
                [id.get()],
                |row| {
                    Ok(Teacher {
                        id: TeacherId::new(row.get(0)?),
                        first_name: row.get(1)?,
                        middle_name: row.get(2)?,
                        last_name: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(teacher)
    }

    fn upsert_student(&self, student: &Student) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO students (id, roll_id, first_name, middle_name, last_name)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                roll_id = excluded.roll_id,
                first_name = excluded.first_name,
                middle_name = excluded.middle_name,
                last_name = excluded.last_name
            "#,
            params![
                student.id.get(),
                student.roll_id,
                student.first_name,
                student.middle_name,
                student.last_name
            ],
        )?;
        debug!(student_id = %student.id, "Student saved");
        Ok(())
    }

    fn get_student(&self, id: StudentId) -> StoreResult<Option<Student>> {
        let conn = self.conn()?;
        let student = conn
            .query_row(
                "SELECT id, roll_id, first_name, middle_name, last_name FROM students WHERE id = ?",
                [id.get()],
                |row| {
                    Ok(Student {
                        id: StudentId::new(row.get(0)?),
                        roll_id: row.get(1)?,
                        first_name: row.get(2)?,
                        middle_name: row.get(3)?,
                        last_name: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(student)
    }

    fn upsert_course(&self, course: &Course) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO courses (id, name, credit_hours, faculty_id, department_id, semester_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                credit_hours = excluded.credit_hours,
                faculty_id = excluded.faculty_id,
                department_id = excluded.department_id,
                semester_id = excluded.semester_id
            "#,
            params![
                course.id.get(),
                course.name,
                course.credit_hours,
                course.faculty_id.get(),
                course.department_id.get(),
                course.semester_id.get()
            ],
        )?;
        debug!(course_id = %course.id, "Course saved");
        Ok(())
    }

    fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>> {
        let conn = self.conn()?;
        let course = conn
            .query_row(
                "SELECT id, name, credit_hours, faculty_id, department_id, semester_id
                 FROM courses WHERE id = ?",
                [id.get()],
                |row| {
                    Ok(Course {
                        id: CourseId::new(row.get(0)?),
                        name: row.get(1)?,
                        credit_hours: row.get(2)?,
                        faculty_id: FacultyId::new(row.get(3)?),
                        department_id: DepartmentId::new(row.get(4)?),
                        semester_id: SemesterId::new(row.get(5)?),
                    })
                },
            )
            .optional()?;
        Ok(course)
    }

    fn assign_course(&self, teacher: TeacherId, course: CourseId) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO teacher_courses (teacher_id, course_id) VALUES (?, ?)
             ON CONFLICT(teacher_id, course_id) DO NOTHING",
            params![teacher.get(), course.get()],
        )?;
        debug!(teacher_id = %teacher, course_id = %course, "Course assigned");
        Ok(())
    }

    fn teacher_courses(&self, teacher: TeacherId) -> StoreResult<Vec<CourseId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT course_id FROM teacher_courses WHERE teacher_id = ? ORDER BY course_id",
        )?;
        let courses = stmt
            .query_map([teacher.get()], |row| row.get::<_, i64>(0).map(CourseId::new))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    fn add_enrollment(&self, enrollment: &Enrollment) -> StoreResult<bool> {
        let conn = self.conn()?;
        let cohort = &enrollment.cohort;
        let inserted = conn.execute(
            r#"
            INSERT INTO enrollments
                (student_id, faculty_id, department_id, academic_year_id, semester_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
            params![
                enrollment.student_id.get(),
                cohort.faculty_id.get(),
                cohort.department_id.get(),
                cohort.academic_year_id.get(),
                cohort.semester_id.get(),
                rollcall_util::now().to_rfc3339()
            ],
        )?;
        Ok(inserted == 1)
    }

    fn find_batch_for_course(
        &self,
        cohort: &CohortKey,
        course: CourseId,
    ) -> StoreResult<Option<Batch>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM batches
             WHERE faculty_id = ? AND department_id = ? AND semester_id = ? AND course_id = ?",
            BATCH_COLUMNS
        );
        let batch = conn
            .query_row(
                &sql,
                params![
                    cohort.faculty_id.get(),
                    cohort.department_id.get(),
                    cohort.semester_id.get(),
                    course.get()
                ],
                batch_from_row,
            )
            .optional()?;
        Ok(batch)
    }

    fn insert_batch(&self, batch: &Batch) -> StoreResult<Vec<LineId>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Holding the write lock, so no enrollment can land between this
        // read and the commit
        let students = enrolled_in(&tx, &batch.cohort)?;

        tx.execute(
            &format!(
                "INSERT INTO batches ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                BATCH_COLUMNS
            ),
            params![
                batch.id.to_string(),
                batch.course_id.get(),
                batch.teacher_id.get(),
                batch.cohort.faculty_id.get(),
                batch.cohort.department_id.get(),
                batch.cohort.academic_year_id.get(),
                batch.cohort.semester_id.get(),
                format_day(batch.start_month),
                format_day(batch.end_month),
                batch.created_at.to_rfc3339()
            ],
        )?;

        let mut line_ids = Vec::with_capacity(students.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO attendance_lines (batch_id, student_id, created_at) VALUES (?, ?, ?)",
            )?;
            let batch_id = batch.id.to_string();
            let created_at = batch.created_at.to_rfc3339();
            for student in &students {
                stmt.execute(params![batch_id, student.get(), created_at])?;
                line_ids.push(LineId::new(tx.last_insert_rowid()));
            }
        }

        tx.commit()?;
        debug!(batch_id = %batch.id, lines = line_ids.len(), "Batch inserted");
        Ok(line_ids)
    }

    fn get_batch(&self, id: &BatchId) -> StoreResult<Option<Batch>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM batches WHERE id = ?", BATCH_COLUMNS);
        let batch = conn
            .query_row(&sql, [id.to_string()], batch_from_row)
            .optional()?;
        Ok(batch)
    }

    fn list_batches(&self, query: &BatchQuery) -> StoreResult<Vec<Batch>> {
        let conn = self.conn()?;
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(teacher) = query.teacher_id {
            clauses.push("teacher_id = ?");
            values.push(Value::Integer(teacher.get()));
        }
        if let Some(cohort) = &query.cohort {
            clauses.push("faculty_id = ?");
            values.push(Value::Integer(cohort.faculty_id.get()));
            clauses.push("department_id = ?");
            values.push(Value::Integer(cohort.department_id.get()));
            clauses.push("academic_year_id = ?");
            values.push(Value::Integer(cohort.academic_year_id.get()));
            clauses.push("semester_id = ?");
            values.push(Value::Integer(cohort.semester_id.get()));
        }

        let mut sql = format!("SELECT {} FROM batches", BATCH_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at, course_id");

        let mut stmt = conn.prepare(&sql)?;
        let batches = stmt
            .query_map(params_from_iter(values.iter()), batch_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    fn delete_batch(&self, id: &BatchId) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let batch_id = id.to_string();

        if !batch_exists(&tx, id)? {
            return Err(StoreError::NotFound(format!("batch {}", id)));
        }

        tx.execute(
            "DELETE FROM weekly_details
             WHERE line_id IN (SELECT id FROM attendance_lines WHERE batch_id = ?)",
            [&batch_id],
        )?;
        let lines = tx.execute("DELETE FROM attendance_lines WHERE batch_id = ?", [&batch_id])?;
        tx.execute("DELETE FROM batches WHERE id = ?", [&batch_id])?;

        tx.commit()?;
        debug!(batch_id = %id, lines, "Batch deleted");
        Ok(lines)
    }

    fn batch_lines(&self, id: &BatchId) -> StoreResult<Vec<AttendanceLine>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM attendance_lines WHERE batch_id = ? ORDER BY id",
            LINE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map([id.to_string()], line_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    fn batch_line_count(&self, id: &BatchId) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM attendance_lines WHERE batch_id = ?",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_line(&self, id: LineId) -> StoreResult<Option<AttendanceLine>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM attendance_lines WHERE id = ?", LINE_COLUMNS);
        let line = conn.query_row(&sql, [id.get()], line_from_row).optional()?;
        Ok(line)
    }

    fn all_line_ids(&self) -> StoreResult<Vec<LineId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM attendance_lines ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0).map(LineId::new))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn student_has_line(
        &self,
        student: StudentId,
        course: CourseId,
        start_month: NaiveDate,
        end_month: NaiveDate,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM attendance_lines l
                JOIN batches b ON b.id = l.batch_id
                WHERE l.student_id = ? AND b.course_id = ?
                  AND b.start_month = ? AND b.end_month = ?
             )",
            params![
                student.get(),
                course.get(),
                format_day(start_month),
                format_day(end_month)
            ],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn insert_lines(
        &self,
        lines: &[(BatchId, StudentId)],
        created_at: DateTime<Local>,
    ) -> StoreResult<Vec<LineId>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let created_at = created_at.to_rfc3339();

        let mut inserted = Vec::new();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO attendance_lines (batch_id, student_id, created_at) VALUES (?, ?, ?)
                 ON CONFLICT(batch_id, student_id) DO NOTHING",
            )?;
            for (batch, student) in lines {
                if stmt.execute(params![batch.to_string(), student.get(), created_at])? == 1 {
                    inserted.push(LineId::new(tx.last_insert_rowid()));
                }
            }
        }

        tx.commit()?;
        debug!(requested = lines.len(), inserted = inserted.len(), "Lines inserted");
        Ok(inserted)
    }

    fn line_details(&self, line: LineId) -> StoreResult<Vec<WeeklyDetail>> {
        let conn = self.conn()?;
        load_line_details(&conn, line)
    }

    fn week_details(
        &self,
        batch: &BatchId,
        month: u32,
        week: u32,
    ) -> StoreResult<Vec<WeeklyDetail>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.line_id, d.month, d.week, d.hour1, d.hour2, d.hour3
             FROM weekly_details d
             JOIN attendance_lines l ON l.id = d.line_id
             WHERE l.batch_id = ? AND d.month = ? AND d.week = ?
             ORDER BY d.line_id",
        )?;
        let details = stmt
            .query_map(params![batch.to_string(), month, week], detail_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(details)
    }

    fn record_week(
        &self,
        batch: &BatchId,
        month: u32,
        week: u32,
        presence: &[(StudentId, HourSlots)],
        recompute: RecomputeFn<'_>,
    ) -> StoreResult<Vec<(LineId, LineTotals)>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !batch_exists(&tx, batch)? {
            return Err(StoreError::NotFound(format!("batch {}", batch)));
        }

        // Enumerate lines under the write lock so a line added by a
        // concurrent reconcile still gets this week's row
        let line_of: HashMap<StudentId, LineId> = {
            let mut stmt =
                tx.prepare("SELECT student_id, id FROM attendance_lines WHERE batch_id = ?")?;
            let pairs = stmt
                .query_map([batch.to_string()], |row| {
                    Ok((StudentId::new(row.get(0)?), LineId::new(row.get(1)?)))
                })?
                .collect::<Result<HashMap<_, _>, _>>()?;
            pairs
        };

        let mut slots_of: HashMap<LineId, HourSlots> = HashMap::with_capacity(presence.len());
        for (student, slots) in presence {
            let line = line_of.get(student).ok_or_else(|| {
                StoreError::NotFound(format!("student {} in batch {}", student, batch))
            })?;
            slots_of.insert(*line, *slots);
        }

        let lines = line_ids_of_batch(&tx, batch)?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO weekly_details (line_id, month, week, hour1, hour2, hour3)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(line_id, month, week) DO UPDATE SET
                    hour1 = excluded.hour1,
                    hour2 = excluded.hour2,
                    hour3 = excluded.hour3
                "#,
            )?;
            for line in &lines {
                let slots = slots_of.get(line).copied().unwrap_or(HourSlots::ABSENT);
                stmt.execute(params![
                    line.get(),
                    month,
                    week,
                    slots.hour1,
                    slots.hour2,
                    slots.hour3
                ])?;
            }
        }

        let totals = recompute_in(&tx, &lines, recompute)?;

        tx.commit()?;
        debug!(batch_id = %batch, month, week, lines = totals.len(), "Week recorded");
        Ok(totals)
    }

    fn recompute_lines(
        &self,
        lines: &[LineId],
        recompute: RecomputeFn<'_>,
    ) -> StoreResult<Vec<(LineId, LineTotals)>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let totals = recompute_in(&tx, lines, recompute)?;
        tx.commit()?;
        Ok(totals)
    }

    fn query_lines(&self, query: &LineQuery) -> StoreResult<Vec<AttendanceLineView>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            clauses.push("l.final_status = ?".into());
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(teacher) = query.teacher_id {
            clauses.push("b.teacher_id = ?".into());
            values.push(Value::Integer(teacher.get()));
        }
        if let Some(student) = query.student_id {
            clauses.push("l.student_id = ?".into());
            values.push(Value::Integer(student.get()));
        }
        if let Some(courses) = &query.course_ids {
            if courses.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; courses.len()].join(", ");
            clauses.push(format!("b.course_id IN ({})", placeholders));
            values.extend(courses.iter().map(|c| Value::Integer(c.get())));
        }

        let f = &query.filters;
        let equalities = [
            ("b.faculty_id", f.faculty_id.map(|v| v.get())),
            ("b.department_id", f.department_id.map(|v| v.get())),
            ("b.academic_year_id", f.academic_year_id.map(|v| v.get())),
            ("b.semester_id", f.semester_id.map(|v| v.get())),
            ("l.student_id", f.student_id.map(|v| v.get())),
            ("b.course_id", f.course_id.map(|v| v.get())),
        ];
        for (column, value) in equalities {
            if let Some(value) = value {
                clauses.push(format!("{} = ?", column));
                values.push(Value::Integer(value));
            }
        }

        let mut sql = String::from(
            "SELECT l.id, l.batch_id, l.student_id, s.first_name, s.middle_name, s.last_name,
                    b.course_id, c.name, b.teacher_id,
                    b.faculty_id, b.department_id, b.academic_year_id, b.semester_id,
                    l.created_at, l.hours_present, l.hours_absent, l.final_status
             FROM attendance_lines l
             JOIN batches b ON b.id = l.batch_id
             JOIN students s ON s.id = l.student_id
             JOIN courses c ON c.id = b.course_id",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY c.name, s.first_name, s.middle_name, s.last_name, l.id");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let first: String = row.get(3)?;
                let middle: String = row.get(4)?;
                let last: String = row.get(5)?;
                Ok(AttendanceLineView {
                    line_id: LineId::new(row.get(0)?),
                    batch_id: batch_id_at(row, 1)?,
                    student_id: StudentId::new(row.get(2)?),
                    student_name: format_full_name(&first, &middle, &last),
                    course_id: CourseId::new(row.get(6)?),
                    course_name: row.get(7)?,
                    teacher_id: TeacherId::new(row.get(8)?),
                    cohort: cohort_at(row, 9)?,
                    created_at: timestamp_at(row, 13)?,
                    hours_present: row.get(14)?,
                    hours_absent: row.get(15)?,
                    final_status: status_at(row, 16)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
