use clap::{Parser, Subcommand};
use coursepay::application::enrollment::EnrollmentService;
use coursepay::config::{Config, DEFAULT_JWT_SECRET};
use coursepay::domain::ports::{AuditLogBox, CourseStoreBox, PaymentRecordStoreBox};
use coursepay::infrastructure::in_memory::{
    InMemoryAuditLog, InMemoryCourseStore, InMemoryPaymentRecordStore,
};
#[cfg(feature = "storage-rocksdb")]
use coursepay::infrastructure::rocksdb::RocksDBStore;
use coursepay::infrastructure::stripe::gateway_from_config;
use coursepay::interfaces::csv::attempt_reader::AttemptReader;
use coursepay::interfaces::csv::catalog_reader::CatalogReader;
use coursepay::interfaces::csv::course_writer::CourseWriter;
use coursepay::interfaces::http::{AppState, router};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the checkout HTTP API
    Serve {
        /// Overrides BIND_ADDR / PORT
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Replay enrollment attempts from a CSV file and print a course summary
    Enroll {
        /// Enrollment attempts CSV file
        input: PathBuf,
        /// Course catalog CSV loaded before replaying
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Check enrollment counters against enrolled sets and repair mismatches
    Verify {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

struct Stores {
    courses: CourseStoreBox,
    payments: PaymentRecordStoreBox,
    audit: AuditLogBox,
}

impl Stores {
    fn in_memory() -> Self {
        Self {
            courses: Box::new(InMemoryCourseStore::new()),
            payments: Box::new(InMemoryPaymentRecordStore::new()),
            audit: Box::new(InMemoryAuditLog::new()),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(&path).into_diagnostic()?;
            debug!(path = %path.display(), "using RocksDB storage");
            Ok(Stores {
                courses: Box::new(store.clone()),
                payments: Box::new(store.clone()),
                audit: Box::new(store),
            })
        }
        None => Ok(Stores::in_memory()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Stores::in_memory())
}

fn build_service(config: &Config, stores: Stores) -> Result<EnrollmentService> {
    let gateway = gateway_from_config(config).into_diagnostic()?;
    Ok(
        EnrollmentService::new(stores.courses, stores.payments, stores.audit, gateway)
            .with_bypass_policy(config.bypass_policy),
    )
}

async fn load_catalog(service: &EnrollmentService, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let mut loaded = 0usize;
    for course in CatalogReader::new(file).courses() {
        match course {
            Ok(course) => {
                service.courses().store(course).await.into_diagnostic()?;
                loaded += 1;
            }
            Err(e) => error!(error = %e, "Error reading course"),
        }
    }
    info!(loaded, catalog = %path.display(), "catalog loaded");
    Ok(())
}

async fn run_enroll(service: EnrollmentService, input: &Path) -> Result<()> {
    let file = File::open(input).into_diagnostic()?;
    for attempt in AttemptReader::new(file).attempts() {
        match attempt {
            Ok(attempt) => match service.enroll(attempt).await {
                Ok(outcome) => debug!(
                    course = %outcome.course_id,
                    student = %outcome.student_id,
                    path = ?outcome.path,
                    newly_enrolled = outcome.newly_enrolled,
                    "enrollment settled"
                ),
                Err(e) => error!(error = %e, kind = e.kind(), "Error processing enrollment"),
            },
            Err(e) => error!(error = %e, "Error reading enrollment"),
        }
    }

    let mut summary = Vec::new();
    for course in service.courses().get_all().await.into_diagnostic()? {
        let payments = service
            .payments()
            .for_course(&course.id)
            .await
            .into_diagnostic()?
            .len();
        summary.push((course, payments));
    }

    let stdout = io::stdout();
    let mut writer = CourseWriter::new(stdout.lock());
    writer.write_courses(summary).into_diagnostic()?;
    Ok(())
}

async fn run_verify(service: EnrollmentService) -> Result<()> {
    let courses = service.courses().get_all().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut repaired = 0usize;

    for course in &courses {
        if let Some(previous) = service
            .courses()
            .repair_count(&course.id)
            .await
            .into_diagnostic()?
        {
            repaired += 1;
            warn!(course = %course.id, previous, actual = course.enrolled.len(), "enrollment count repaired");
            writeln!(
                out,
                "repaired {}: enrollment_count {} -> {}",
                course.id,
                previous,
                course.enrolled.len()
            )
            .into_diagnostic()?;
        }
    }
    writeln!(
        out,
        "verified {} courses, repaired {}",
        courses.len(),
        repaired
    )
    .into_diagnostic()?;
    Ok(())
}

async fn run_serve(config: &Config, service: EnrollmentService, bind: SocketAddr) -> Result<()> {
    if config.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("JWT_SECRET is not set; using the development secret");
    }
    let state = AppState::new(service, &config.jwt_secret);
    let listener = tokio::net::TcpListener::bind(bind).await.into_diagnostic()?;
    info!(%bind, processor = config.processor_configured(), "checkout API listening");
    axum::serve(listener, router(state)).await.into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coursepay=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal()),
        )
        .init();

    let config = Config::from_env().into_diagnostic()?;
    let stores = open_stores(cli.db_path)?;
    let service = build_service(&config, stores)?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or(config.bind_addr);
            run_serve(&config, service, bind).await
        }
        Command::Enroll { input, catalog } => {
            if let Some(catalog) = catalog {
                load_catalog(&service, &catalog).await?;
            }
            run_enroll(service, &input).await
        }
        Command::Verify { catalog } => {
            if let Some(catalog) = catalog {
                load_catalog(&service, &catalog).await?;
            }
            run_verify(service).await
        }
    }
}
