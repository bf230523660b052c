use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use blueprint::api::{self, AppState};
use blueprint::db::Database;
use blueprint::llm::OpenRouterClient;
use blueprint::models::{EnhancementRequest, ModuleOutcome, SpliceOutcome, TargetType};
use blueprint::pipeline::{load_project_tree, Pipeline};
use blueprint::render;

#[derive(Parser)]
#[command(name = "bprt")]
#[command(about = "Turn business requirements documents into modules, user stories and features")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Extract a document and print the hierarchy as JSON, without saving it
    Extract {
        /// Plain-text document
        file: PathBuf,
    },
    /// Extract a document and save it as a new project
    Import {
        /// Plain-text document
        file: PathBuf,
        /// Project name (defaults to the extracted name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print a stored project's hierarchy
    Tree { project_id: Uuid },
    /// Apply a natural-language change to a stored project
    Enhance {
        project_id: Uuid,
        /// The change, e.g. "add a remember-me option to the login form"
        request: String,
        /// Level the change targets: module, userStory or feature
        #[arg(long, value_parser = parse_target_type)]
        target_type: Option<TargetType>,
        /// Id of the node the change targets
        #[arg(long)]
        target_id: Option<Uuid>,
        /// Save the updated node back into the project
        #[arg(long)]
        apply: bool,
    },
}

fn parse_target_type(s: &str) -> Result<TargetType, String> {
    TargetType::from_str(s).ok_or_else(|| format!("unknown target type '{}'", s))
}

/// Initialize tracing to stdout for the server, stderr for one-shot commands
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "blueprint=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // One-shot commands print results on stdout
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_database() -> anyhow::Result<Database> {
    let db = Database::open_default()?;
    db.migrate()?;
    Ok(db)
}

fn pipeline_from_env() -> anyhow::Result<Pipeline> {
    let client = OpenRouterClient::from_env()?;
    Ok(Pipeline::new(Arc::new(client)))
}

async fn serve(port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting Blueprint server on port {}", port);

    let db = open_database()?;
    let state = match pipeline_from_env() {
        Ok(pipeline) => AppState::new(db, pipeline),
        Err(e) => {
            tracing::warn!("Backend unavailable, extraction routes disabled: {}", e);
            AppState::without_backend(db, e.to_string())
        }
    };

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Blueprint server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = !matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(use_stderr);

    match cli.command {
        Some(Commands::Serve { port }) => serve(port).await?,
        Some(Commands::Extract { file }) => {
            let pipeline = pipeline_from_env()?;
            let text = tokio::fs::read_to_string(&file).await?;
            let tree = pipeline.extract_from_document(&text).await?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Some(Commands::Import { file, name }) => {
            let pipeline = pipeline_from_env()?;
            let db = open_database()?;
            let text = tokio::fs::read_to_string(&file).await?;
            let tree = pipeline.extract_from_document(&text).await?;
            let (project, report) = db.create_project_from_tree(&tree, name)?;

            println!("Imported '{}' as {}", project.name, project.id);
            for (module, outcome) in report.module_outcomes() {
                match outcome {
                    ModuleOutcome::Created(id) => println!("  ok      {} ({})", module, id),
                    ModuleOutcome::Failed(reason) => println!("  failed  {}: {}", module, reason),
                }
            }
            for step in report.failures() {
                eprintln!("failed {:?} {}", step.kind, step.path);
            }
            println!();
            print!("{}", render::render_tree(&tree));
        }
        Some(Commands::Tree { project_id }) => {
            let db = open_database()?;
            let tree = load_project_tree(&db, project_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Project {} not found", project_id))?;
            print!("{}", render::render_tree(&tree));
        }
        Some(Commands::Enhance {
            project_id,
            request,
            target_type,
            target_id,
            apply,
        }) => {
            let pipeline = pipeline_from_env()?;
            let db = open_database()?;
            let mut tree = load_project_tree(&db, project_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Project {} not found", project_id))?;

            let request = EnhancementRequest {
                enhancement_request: request,
                target_type,
                target_id,
            };
            let result = pipeline.reconcile(&tree, &request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if apply {
                match tree.splice(result.fragment()?, target_id) {
                    SpliceOutcome::Replaced { path } => {
                        let report = db
                            .replace_project_tree(project_id, &tree)?
                            .ok_or_else(|| anyhow::anyhow!("Project {} not found", project_id))?;
                        println!("Updated {} ({} failed steps)", path, report.failures().count());
                    }
                    SpliceOutcome::NotFound => {
                        anyhow::bail!("No {} in the project matches the update", result.target_type.as_str())
                    }
                }
            }
        }
        None => serve(3000).await?,
    }

    Ok(())
}
