//! groupexec CLI - run node groups in sequence on a queue server

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::warn;

use groupexec::{
    ExecutionPlan, ExecutorConfig, FixSuggestion, Graph, GroupExecError, GroupResolver,
    HttpQueueClient, ItemKind, NodeCatalog, OrchestrationRun, Orchestrator, Prompt,
    PromptSubmission, QueueBackend, RunOutcome, Workspace,
};

#[derive(Parser)]
#[command(name = "groupexec")]
#[command(about = "Run node groups in sequence on a queue-based graph server")]
#[command(version)]
struct Cli {
    /// Server URL (overrides config file and GROUPEXEC_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Submit each group from this process
    Client,
    /// Hand the whole plan to the server extension
    Backend,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan
    Run {
        /// Plan file (.yaml or .json)
        plan: Option<PathBuf>,

        /// Comma or newline separated group names instead of a plan file
        #[arg(long, conflicts_with = "plan")]
        groups: Option<String>,

        /// Repetitions per group (with --groups)
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Seconds to wait after each repetition (with --groups)
        #[arg(long, default_value_t = 0.0)]
        delay: f64,

        /// Workflow layout exported by the editor (nodes and groups)
        #[arg(long)]
        workflow: PathBuf,

        /// API-format prompt of the whole graph
        #[arg(long)]
        prompt: PathBuf,

        /// Node catalog (object_info JSON); fetched from the server when omitted
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Mode::Client)]
        mode: Mode,

        /// Executor id reported to the server
        #[arg(long, default_value = "cli")]
        node_id: String,

        /// Re-roll seed inputs on every submission
        #[arg(long)]
        randomize_seeds: bool,
    },

    /// Validate a plan file (parse only)
    Validate {
        /// Plan file (.yaml or .json)
        plan: PathBuf,
    },

    /// List groups and the output nodes they resolve to
    Groups {
        #[arg(long)]
        workflow: PathBuf,

        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Show queue occupancy
    Status,

    /// Interrupt the job the server is running
    Interrupt,

    /// Submit a whole-graph prompt (sender nodes are reduced to their dependencies)
    Submit {
        #[arg(long)]
        prompt: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.downcast_ref::<GroupExecError>().and_then(|e| e.fix_suggestion()) {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = ExecutorConfig::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config = config.with_server_url(server);
    }

    match cli.command {
        Commands::Run {
            plan,
            groups,
            repeat,
            delay,
            workflow,
            prompt,
            catalog,
            mode,
            node_id,
            randomize_seeds,
        } => {
            config.randomize_seeds |= randomize_seeds;
            let plan = match (plan, groups) {
                (Some(path), _) => load_plan(&path)?,
                (None, Some(list)) => ExecutionPlan::from_group_list(&list, repeat, delay)?,
                (None, None) => bail!("Provide a plan file or --groups"),
            };
            run_plan(&config, plan, &workflow, &prompt, catalog.as_deref(), mode, node_id).await
        }
        Commands::Validate { plan } => validate_plan(&plan),
        Commands::Groups { workflow, catalog } => list_groups(&config, &workflow, catalog.as_deref()).await,
        Commands::Status => show_status(&config).await,
        Commands::Interrupt => {
            client(&config)?.interrupt().await?;
            println!("{} Interrupt sent", "✓".green());
            Ok(())
        }
        Commands::Submit { prompt } => submit_prompt(&config, &prompt).await,
    }
}

fn client(config: &ExecutorConfig) -> Result<Arc<HttpQueueClient>> {
    config.validate()?;
    Ok(Arc::new(HttpQueueClient::new(config)?))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_plan(path: &Path) -> Result<ExecutionPlan> {
    ExecutionPlan::from_path(path).with_context(|| format!("Failed to load plan {}", path.display()))
}

async fn load_catalog(config: &ExecutorConfig, path: Option<&Path>) -> Result<NodeCatalog> {
    match path {
        Some(path) => Ok(NodeCatalog::from_json(&read(path)?)
            .map_err(GroupExecError::from)
            .with_context(|| format!("Invalid catalog {}", path.display()))?),
        None => Ok(client(config)?.object_info().await?),
    }
}

fn load_graph(path: &Path) -> Result<Graph> {
    Graph::from_json(&read(path)?)
        .map_err(GroupExecError::from)
        .with_context(|| format!("Invalid workflow layout {}", path.display()))
}

async fn run_plan(
    config: &ExecutorConfig,
    plan: ExecutionPlan,
    workflow: &Path,
    prompt: &Path,
    catalog: Option<&Path>,
    mode: Mode,
    node_id: String,
) -> Result<()> {
    let graph = load_graph(workflow)?;
    let prompt = Prompt::from_json(&read(prompt)?)?;
    let catalog = load_catalog(config, catalog).await?;
    let workspace = Workspace::new(graph, catalog, prompt);

    let client = client(config)?;
    let orchestrator = Arc::new(Orchestrator::from_config(node_id, client, config));

    let on_ctrl_c = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Interrupting...", "!".yellow().bold());
            on_ctrl_c.interrupt().await;
        }
    });

    println!(
        "{} Running {} item(s) on {} ({:?} mode)",
        "→".cyan(),
        plan.len(),
        config.server_url.cyan().bold(),
        mode
    );

    let mut run = OrchestrationRun::new();
    let outcome = match mode {
        Mode::Client => orchestrator.execute(&mut run, &plan, &workspace).await?,
        Mode::Backend => orchestrator.delegate(&mut run, &plan, &workspace).await?,
    };

    match outcome {
        RunOutcome::Completed { total_tasks } => {
            println!("{} Completed ({}/{})", "✓".green(), total_tasks, total_tasks)
        }
        RunOutcome::Cancelled { completed_tasks, total_tasks } => {
            println!("{} Cancelled after {}/{} task(s)", "✗".yellow(), completed_tasks, total_tasks)
        }
        RunOutcome::Delegated { items, message } => {
            println!("{} Server accepted {} item(s): {}", "✓".green(), items, message)
        }
    }
    Ok(())
}

fn validate_plan(path: &Path) -> Result<()> {
    let plan = load_plan(path)?;

    println!("{} Plan is valid", "✓".green());
    println!("  Items: {}", plan.len());
    println!("  Tasks: {}", plan.task_count());
    for (index, item) in plan.items().iter().enumerate() {
        match &item.kind {
            ItemKind::Group { name, repeat_count } => println!(
                "  {}. {} x{} (delay {}s)",
                index + 1,
                name.cyan(),
                repeat_count,
                item.delay_seconds
            ),
            ItemKind::Delay => println!("  {}. {} {}s", index + 1, "wait".dimmed(), item.delay_seconds),
        }
    }
    Ok(())
}

async fn list_groups(config: &ExecutorConfig, workflow: &Path, catalog: Option<&Path>) -> Result<()> {
    let graph = load_graph(workflow)?;
    let catalog = load_catalog(config, catalog).await?;
    let resolver = GroupResolver::new(&graph, &catalog);

    if graph.groups.is_empty() {
        warn!("Workflow has no groups");
    }
    for group in &graph.groups {
        let binding = resolver.resolve(&group.title);
        let outputs = if binding.is_empty() {
            "(no output nodes)".dimmed().to_string()
        } else {
            binding.node_ids.join(", ")
        };
        println!("{}: {}", group.title.cyan().bold(), outputs);
    }
    Ok(())
}

async fn show_status(config: &ExecutorConfig) -> Result<()> {
    let status = client(config)?.queue_status().await?;
    let state = if status.is_idle() { "idle".green() } else { "busy".yellow() };
    println!(
        "Queue {}: {} running, {} pending",
        state, status.running_count, status.pending_count
    );
    Ok(())
}

async fn submit_prompt(config: &ExecutorConfig, path: &Path) -> Result<()> {
    let prompt = Prompt::from_json(&read(path)?)?;
    let accepted = client(config)?.submit(PromptSubmission::new(prompt)).await?;
    println!("{} Queued prompt {}", "✓".green(), accepted.prompt_id.cyan());
    Ok(())
}
