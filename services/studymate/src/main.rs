use clap::{Parser, Subcommand};
use sea_orm::Database;
use tracing::{info, warn};

use studymate::config::StudyMateConfig;
use studymate::infra::mirror::MongoMirrorStore;
use studymate::infra::storage::CloudinaryClient;
use studymate::router::build_router;
use studymate::state::AppState;
use studymate::usecase::seed::SeedAcademicStructureUseCase;
use studymate::usecase::user::{CreateUserInput, ProvisionAdminUseCase, ProvisionOutcome};
use studymate_core::tracing::init_tracing;
use studymate_domain::user::UserRole;

/// Outbox rows handled per drainer tick.
const DRAIN_BATCH: u64 = 100;

#[derive(Parser)]
#[command(about = "StudyMate study material service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and the sync outbox drainer (default)
    Serve,
    /// Create the BSc Computer Science curriculum; safe to re-run
    Seed,
    /// Create an administrator account unless the username already exists
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Falls back to the ADMIN_PASSWORD environment variable
        #[arg(long, env = "ADMIN_PASSWORD")]
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Rebuild the mirror store from the entity store
    Reconcile,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = StudyMateConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let mirror = MongoMirrorStore::connect(&config.mongodb_uri, &config.mongodb_database)
        .await
        .expect("invalid MONGODB_URI");
    if let Err(e) = mirror.ensure_indexes().await {
        warn!(error = %e, "mirror indexes not created yet; mirror writes will retry");
    }

    let storage =
        CloudinaryClient::new(config.cloudinary.clone()).expect("failed to build storage client");

    let state = AppState::new(
        db,
        mirror,
        storage,
        &config.jwt_secret,
        config.media_root.clone(),
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state, &config).await,
        Command::Seed => {
            let usecase = SeedAcademicStructureUseCase {
                departments: state.department_repo(),
                years: state.year_repo(),
                semesters: state.semester_repo(),
                subjects: state.subject_repo(),
            };
            let report = usecase.execute().await.expect("seed failed");
            info!(?report, "academic structure seeded");
        }
        Command::CreateAdmin {
            username,
            email,
            password,
            first_name,
            last_name,
        } => {
            let usecase = ProvisionAdminUseCase {
                users: state.user_repo(),
                sync: state.sync.clone(),
            };
            let outcome = usecase
                .execute(CreateUserInput {
                    username: username.clone(),
                    email,
                    password,
                    first_name,
                    last_name,
                    role: UserRole::Admin,
                })
                .await
                .expect("failed to create admin");
            match outcome {
                ProvisionOutcome::Created(id) => info!(user_id = %id, %username, "admin created"),
                ProvisionOutcome::AlreadyExists => info!(%username, "admin already exists"),
            }
        }
        Command::Reconcile => {
            let report = state.sync.reconcile_all().await.expect("reconcile failed");
            info!(?report, "mirror reconciled");
        }
    }
}

async fn serve(state: AppState, config: &StudyMateConfig) {
    let sync = state.sync.clone();
    let mut interval = tokio::time::interval(config.sync_drain_interval);
    tokio::spawn(async move {
        loop {
            interval.tick().await;
            match sync.drain_outbox(DRAIN_BATCH).await {
                Ok(report) if report.applied + report.rescheduled + report.failed > 0 => {
                    info!(?report, "sync outbox drained");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "sync outbox drain failed"),
            }
        }
    });

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("studymate listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}
