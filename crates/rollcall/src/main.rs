//! rollcall - attendance batches from the command line
//!
//! This is the main entry point for the rollcall front end.
//! It wires together:
//! - Configuration loading
//! - Store initialization
//! - The attendance engine
//! - An NDJSON request loop over stdin/stdout

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_api::{
    CallerContext, Command, ErrorCode, ErrorInfo, Request, Response, ResponsePayload, API_VERSION,
};
use rollcall_config::{load_config, Policy};
use rollcall_core::{AttendanceEngine, EngineError};
use rollcall_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use rollcall_util::default_config_path;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// rollcall - Attendance batches and exam eligibility
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Attendance batches and exam eligibility", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rollcall/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set ROLLCALL_DATA_DIR env var)
    #[arg(short, long, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Read NDJSON requests from stdin and write one response per line to stdout
    Exec,

    /// Re-derive the totals and verdict of every attendance line
    Recompute,
}

/// Main service state
struct Service {
    engine: AttendanceEngine,
    store: Arc<dyn Store>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        // Load configuration; a missing file means defaults
        let mut policy = if args.config.exists() {
            load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?
        } else {
            warn!(
                config_path = %args.config.display(),
                "Config file not found, using defaults"
            );
            Policy::default()
        };

        info!(
            config_path = %args.config.display(),
            absence_threshold_hours = policy.attendance.absence_threshold_hours,
            "Configuration loaded"
        );

        if let Some(data_dir) = &args.data_dir {
            policy.service.data_dir = data_dir.clone();
        }

        // Create data directory
        let data_dir = policy.service.data_dir.clone();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        // Initialize store
        let db_path = policy.service.database_path();
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        Ok(Self::with_store(policy, store))
    }

    fn with_store(policy: Policy, store: Arc<dyn Store>) -> Self {
        let engine = AttendanceEngine::new(policy, store.clone());
        Self { engine, store }
    }

    async fn run_exec(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        let mut handled: u64 = 0;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read request")? else {
                        debug!("End of input");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    let response = self.handle_line(&line);
                    let mut json = serde_json::to_string(&response)
                        .context("Failed to serialize response")?;
                    json.push('\n');
                    stdout.write_all(json.as_bytes()).await?;
                    stdout.flush().await?;
                    handled += 1;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        info!(requests = handled, "Input drained");
        Ok(())
    }

    fn recompute(&self) -> Result<()> {
        let lines = self
            .engine
            .recompute_all(&CallerContext::admin(0))
            .context("Recompute failed")?;
        println!("Recomputed {} attendance line(s)", lines);
        Ok(())
    }

    fn shutdown(&self) {
        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to record shutdown");
        }
        info!("rollcall stopped");
    }

    /// Parse one NDJSON request line and run it
    fn handle_line(&self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed request");
                return Response::error(
                    0,
                    ErrorInfo::new(ErrorCode::InvalidRequest, format!("Malformed request: {}", e)),
                );
            }
        };

        if request.api_version != API_VERSION {
            return Response::error(
                request.request_id,
                ErrorInfo::new(
                    ErrorCode::InvalidRequest,
                    format!(
                        "Unsupported API version {} (expected {})",
                        request.api_version, API_VERSION
                    ),
                ),
            );
        }

        self.handle_command(&request.caller, request.request_id, request.command)
    }

    fn handle_command(
        &self,
        caller: &CallerContext,
        request_id: u64,
        command: Command,
    ) -> Response {
        let engine = &self.engine;

        let result = match command {
            Command::RegisterTeacher { teacher } => engine
                .register_teacher(caller, &teacher)
                .map(|_| ResponsePayload::Registered),

            Command::RegisterStudent { student } => engine
                .register_student(caller, &student)
                .map(|_| ResponsePayload::Registered),

            Command::RegisterCourse { course } => engine
                .register_course(caller, &course)
                .map(|_| ResponsePayload::Registered),

            Command::AssignCourse {
                teacher_id,
                course_id,
            } => engine
                .assign_course(caller, teacher_id, course_id)
                .map(|_| ResponsePayload::Registered),

            Command::EnrollStudent { student_id, cohort } => engine
                .enroll_student(caller, student_id, &cohort)
                .map(|new_lines| ResponsePayload::Enrolled { new_lines }),

            Command::ReconcileEnrollment { student_id, cohort } => engine
                .reconcile_enrollment(caller, student_id, &cohort)
                .map(|new_lines| ResponsePayload::Enrolled { new_lines }),

            Command::OpenBatch { spec } => engine
                .open_batch(caller, &spec)
                .map(ResponsePayload::BatchOpened),

            Command::DeleteBatch { batch_id } => engine
                .delete_batch(caller, &batch_id)
                .map(|lines_removed| ResponsePayload::BatchDeleted {
                    batch_id,
                    lines_removed,
                }),

            Command::ListBatches => engine
                .list_batches(caller)
                .map(|batches| ResponsePayload::Batches { batches }),

            Command::FillSheet {
                batch_id,
                month,
                week,
            } => engine
                .fill_sheet(caller, &batch_id, month.as_deref(), week)
                .map(ResponsePayload::Sheet),

            Command::RecordWeek {
                batch_id,
                submission,
            } => engine
                .record_week(caller, &batch_id, &submission)
                .map(ResponsePayload::WeekRecorded),

            Command::RecomputeLine { line_id } => engine
                .recompute_line(caller, line_id)
                .map(|_| ResponsePayload::Recomputed { lines: 1 }),

            Command::RecomputeAll => engine
                .recompute_all(caller)
                .map(|lines| ResponsePayload::Recomputed { lines }),

            Command::ListNotAllowed { filters } => engine
                .list_not_allowed(caller, &filters)
                .map(|lines| ResponsePayload::NotAllowed { lines }),

            Command::SummarizeByCourse { student_id } => engine
                .summarize_by_course(caller, student_id)
                .map(|courses| ResponsePayload::CourseSummaries { courses }),

            Command::StudentDashboard { student_id } => engine
                .student_dashboard(caller, student_id)
                .map(ResponsePayload::StudentDashboard),

            Command::TeacherDashboard { teacher_id } => engine
                .teacher_dashboard(caller, teacher_id)
                .map(ResponsePayload::TeacherDashboard),

            Command::GetHealth => Ok(ResponsePayload::Health {
                store_healthy: engine.is_healthy(),
            }),

            Command::Ping => Ok(ResponsePayload::Pong),
        };

        match result {
            Ok(payload) => Response::success(request_id, payload),
            Err(e) => {
                if let EngineError::Store(_) = e {
                    error!(request_id, error = %e, "Request failed");
                } else {
                    debug!(request_id, error = %e, "Request rejected");
                }
                Response::error(request_id, ErrorInfo::from(&e))
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for responses
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "rollcall starting"
    );

    let service = Service::new(&args)?;
    let result = match args.mode {
        Mode::Exec => service.run_exec().await,
        Mode::Recompute => service.recompute(),
    };
    service.shutdown();
    result
}
