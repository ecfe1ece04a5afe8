use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use hub_validate::{
    Config, Error,
    checks::{self, HubContext},
    container,
    harness::{self, Session},
    hub::{HubApi, ServerConfig, WorkspaceConfig},
    report::format_report,
    sse::SseReader,
    term,
};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Mutex,
    time::Duration,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "hub-validate", version, about = "Validates a running MCP hub")]
struct Cli {
    /// Base URL of the hub's HTTP API
    #[arg(long, env = "HUB_BACKEND_URL", default_value = "http://localhost:8765", global = true)]
    backend_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the five infrastructure checks against the hub container
    Validate(ValidateArgs),
    /// Register a test server and workspace with the hub
    Setup(SetupArgs),
    /// Print events from a workspace stream
    Stream(StreamArgs),
    /// Run the Context7 integration suite
    Context7(Context7Args),
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Name of the container hosting the hub
    #[arg(long, env = "HUB_CONTAINER", default_value = "yamcp-ui-dev")]
    container: String,

    /// Container port that must be published, repeatable
    #[arg(long = "port", default_values = ["5173/tcp", "8765/tcp"])]
    ports: Vec<String>,

    /// Events read before giving up on the validation marker
    #[arg(long, default_value_t = 10)]
    max_events: usize,

    /// Seconds to wait for the backend to restart
    #[arg(long, default_value_t = 5.0)]
    reload_window: f64,

    /// Seconds to wait for stdio processes to exit
    #[arg(long, default_value_t = 3.0)]
    cleanup_window: f64,

    #[arg(long, default_value = "validation.log")]
    log_file: PathBuf,

    /// Only log to stderr
    #[arg(long)]
    no_log_file: bool,
}

#[derive(Debug, Args)]
struct SetupArgs {
    #[arg(long, default_value = "test-server")]
    server: String,

    /// Command the hub runs for the server
    #[arg(long, default_value = "hub-demo-server")]
    command: String,

    /// Argument passed to the server command, repeatable
    #[arg(long = "arg")]
    args: Vec<String>,

    #[arg(long, default_value = "test-workspace")]
    workspace: String,
}

#[derive(Debug, Args)]
struct StreamArgs {
    workspace: String,

    #[arg(long, default_value_t = 5)]
    max_events: usize,

    /// Seconds before the connection is dropped
    #[arg(long, default_value_t = 30.0)]
    timeout: f64,
}

#[derive(Debug, Args)]
struct Context7Args {
    /// Streamable HTTP endpoint of the hub workspace
    #[arg(long, env = "MCP_HUB_URL", default_value = "http://localhost:8765/mcp/test0")]
    mcp_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4.1")]
    model: String,

    #[arg(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    /// Per-test timeout in seconds
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("info,{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

async fn validate(config: Config) -> anyhow::Result<ExitCode> {
    let report = match container::select_backend().await {
        Ok(prober) => {
            tracing::info!(backend = prober.backend(), "container backend selected");
            checks::run_validation(HubContext::new(config, prober)).await?
        }
        Err(err) => checks::hub_runner()?.fail_all(&err.to_string()),
    };

    tracing::info!(
        passed = report.passed(),
        failed = report.failed(),
        "validation finished"
    );
    println!("{}", term::paint_report(&format_report(&report)));

    Ok(report.exit_code())
}

async fn setup(api: &HubApi, args: SetupArgs) -> anyhow::Result<ExitCode> {
    let server = ServerConfig::stdio(&args.server, &args.command, args.args);
    let workspace = WorkspaceConfig::new(&args.workspace, [&args.server]);

    let steps = async {
        println!("Adding server {}...", server.name);
        let response = api.add_server(&server).await?;
        if response.status != reqwest::StatusCode::OK {
            println!(
                "{} {} - {}",
                term::paint_red_bold("Failed to add server:"),
                response.status,
                response.body.as_text()
            );
            return Ok(false);
        }
        println!("{} {}", term::paint_green_bold("Server added:"), response.body.as_text());

        println!("Adding workspace {}...", workspace.name);
        let response = api.add_workspace(&workspace).await?;
        if response.status != reqwest::StatusCode::OK {
            println!(
                "{} {} - {}",
                term::paint_red_bold("Failed to add workspace:"),
                response.status,
                response.body.as_text()
            );
            return Ok(false);
        }
        println!("{} {}", term::paint_green_bold("Workspace added:"), response.body.as_text());
        Ok::<_, Error>(true)
    };

    match steps.await {
        Ok(true) => {
            println!();
            println!("Setup complete. You can now:");
            println!("1. Tail the stream: curl -N {}/mcp/{}", api.base_url(), workspace.name);
            println!("2. Or: hub-validate stream {}", workspace.name);
            Ok(ExitCode::SUCCESS)
        }
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(err) if err.is_connectivity() => {
            println!("{} {err}", term::paint_red_bold("Cannot connect to the hub:"));
            println!("Make sure the container is running (docker compose up)");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}

async fn stream(api: &HubApi, args: StreamArgs) -> anyhow::Result<ExitCode> {
    let response = api
        .workspace_stream(&args.workspace, Duration::from_secs_f64(args.timeout))
        .await?;
    tracing::info!(status = %response.status(), "connected to event stream");

    if !response.status().is_success() {
        anyhow::bail!("stream endpoint returned status {}", response.status());
    }

    let mut events = std::pin::pin!(SseReader::from_response(response).events().take(args.max_events));
    let mut received = 0;
    while let Some(event) = events.next().await {
        let event = event?;
        received += 1;
        let kind = event.event.as_deref().unwrap_or("message");
        println!("{} {}", term::paint_yellow_bold(&format!("[{kind}]")), event.data);
    }

    tracing::info!(received, "stream finished");
    Ok(ExitCode::SUCCESS)
}

async fn context7(config: Config) -> ExitCode {
    let suite = harness::context7::suite(config);
    let mut session = Session::new();
    let summary = suite.run(&mut session).await;

    println!("{}", term::paint_report(&harness::format_outcomes(&session)));
    println!("{}", harness::generate_test_report(&session));
    println!("{summary}");

    summary.exit_code()
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let base = Config::default().with_backend_url(&cli.backend_url);
    let api = HubApi::new(base.backend_url.clone(), base.request_timeout);

    match cli.command {
        Command::Validate(args) => {
            let config = base
                .with_container_name(args.container)
                .with_required_ports(args.ports)
                .with_max_events(args.max_events)
                .with_reload_window(Duration::from_secs_f64(args.reload_window))
                .with_cleanup_window(Duration::from_secs_f64(args.cleanup_window))
                .with_log_file((!args.no_log_file).then_some(args.log_file));
            init_tracing(config.log_file.as_deref())?;
            validate(config).await
        }
        Command::Setup(args) => {
            init_tracing(None)?;
            setup(&api, args).await
        }
        Command::Stream(args) => {
            init_tracing(None)?;
            stream(&api, args).await
        }
        Command::Context7(args) => {
            init_tracing(None)?;
            let config = base
                .with_hub_mcp_url(args.mcp_url)
                .with_openai_api_key(args.openai_api_key)
                .with_openai_model(args.model)
                .with_openai_base_url(args.api_base)
                .with_test_timeout(Duration::from_secs_f64(args.timeout));
            Ok(context7(config).await)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("ignoring .env: {err}");
        }
    }

    let cli = Cli::parse();

    tokio::select! {
        result = run(cli) => match result {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err:#}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted by user");
            ExitCode::FAILURE
        }
    }
}
