use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use flock_api::testing::{MockCampaignApi, sample_campaign, sample_checkpoints};
use flock_api::{CampaignApi, DEFAULT_UI_BASE_URL, FlockEnvironment, HttpCampaignClient};
use flock_sdk::{
    BridgeCallbacks, CheckpointOptions, EventEmitter, FlockSession, IdentifyOutcome,
    IdentifyParams, PlacementUrl, PresentOutcome, QueryParams, Rgba, SdkConfig, SessionEvent,
    SurfaceFactory, Url, WebBridge, WebSurface, build_placement_url,
};
use serde_json::{Value, json};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flock-cli")]
#[command(about = "Headless host for the Flock referral SDK")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run(RunArgs),
    PlacementUrl(PlacementUrlArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Public access key; falls back to FLOCK_PUBLIC_ACCESS_KEY.
    #[arg(long)]
    key: Option<String>,
    #[arg(long)]
    environment: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    ui_url: Option<String>,
    #[arg(long, value_enum, default_value_t = Backend::Http)]
    backend: Backend,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    checkpoint: Option<String>,
    #[arg(long)]
    placement: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    navigate: bool,
    /// `key=value`, repeatable.
    #[arg(long = "query")]
    query: Vec<String>,
    /// Raw page message fed to the bridge after presenting, repeatable.
    #[arg(long = "message")]
    messages: Vec<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    event_json: bool,
}

#[derive(clap::Args, Debug)]
struct PlacementUrlArgs {
    #[arg(long)]
    placement_id: String,
    #[arg(long)]
    key: String,
    #[arg(long, default_value = DEFAULT_UI_BASE_URL)]
    ui_url: String,
    #[arg(long)]
    campaign_id: Option<String>,
    #[arg(long)]
    customer_id: Option<String>,
    #[arg(long)]
    bg: Option<String>,
    #[arg(long = "query")]
    query: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Http,
    Mock,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::PlacementUrl(args) => placement_url_command(args),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flock_cli=info,flock_sdk=info,flock_api=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_command(args: RunArgs) -> Result<ExitCode, String> {
    let config = build_config(&args)?;
    let api: Arc<dyn CampaignApi> = match args.backend {
        Backend::Http => Arc::new(HttpCampaignClient::new(
            config.api_url(),
            config.public_access_key.clone(),
        )),
        Backend::Mock => {
            Arc::new(MockCampaignApi::new(sample_campaign()).with_checkpoints(sample_checkpoints()))
        }
    };

    let mut session = FlockSession::with_api(config, api, Arc::new(HeadlessSurfaceFactory::default()));
    if args.event_json {
        session = session.with_event_emitter(Arc::new(JsonLineEmitter));
    }

    session.initialize().await.map_err(|error| error.to_string())?;
    if let Some(campaign) = session.campaign() {
        println!("campaign_id: {}", campaign.id);
    }

    if let Some(user_id) = args.user_id.as_deref() {
        let email = args
            .email
            .clone()
            .ok_or_else(|| "--email is required with --user-id".to_string())?;
        let mut params = IdentifyParams::new(user_id, email);
        if let Some(name) = args.name.as_deref() {
            params = params.with_name(name);
        }
        match session.identify(params).await {
            Ok(IdentifyOutcome::Identified(customer)) => {
                println!("customer_id: {}", customer.id);
                println!("referral_code: {}", customer.referral_code);
            }
            Ok(IdentifyOutcome::Queued) => println!("identify: queued"),
            Err(error) => return Err(error.to_string()),
        }
    }

    let query_params = parse_query(&args.query)?;
    let callbacks = BridgeCallbacks::new()
        .on_close(|| println!("bridge: close"))
        .on_success(|bridge: &WebBridge| println!("bridge: success id={}", bridge.id()))
        .on_invalid(|bridge: &WebBridge| println!("bridge: invalid id={}", bridge.id()));

    let outcome = match (args.checkpoint.as_deref(), args.placement.as_deref()) {
        (Some(_), Some(_)) => {
            return Err("provide only one of --checkpoint or --placement".to_string());
        }
        (Some(name), None) => Some(session.checkpoint(
            name,
            CheckpointOptions {
                navigate: args.navigate,
                query_params,
            },
            callbacks,
        )),
        (None, Some(placement_id)) => {
            Some(session.add_placement(placement_id, callbacks, query_params))
        }
        (None, None) => None,
    };

    let Some(outcome) = outcome else {
        println!("state: {:?}", session.state());
        return Ok(ExitCode::SUCCESS);
    };
    print_outcome(&outcome);

    for message in &args.messages {
        let event = session.handle_bridge_message(message);
        println!(
            "message: {}",
            event.map(|event| event.as_str()).unwrap_or("<ignored>")
        );
    }

    Ok(match outcome {
        PresentOutcome::Skipped(_) => ExitCode::from(2),
        _ => ExitCode::SUCCESS,
    })
}

fn placement_url_command(args: PlacementUrlArgs) -> Result<ExitCode, String> {
    let query_params = parse_query(&args.query)?;
    let url = build_placement_url(
        &args.ui_url,
        &PlacementUrl {
            placement_id: &args.placement_id,
            public_access_key: &args.key,
            campaign_id: args.campaign_id.as_deref(),
            customer_id: args.customer_id.as_deref(),
            background_color: args.bg.as_deref(),
            query_params: query_params.as_ref(),
        },
    )
    .map_err(|error| error.to_string())?;
    println!("{url}");
    Ok(ExitCode::SUCCESS)
}

fn build_config(args: &RunArgs) -> Result<SdkConfig, String> {
    let mut config = match args.key.as_deref() {
        Some(key) => SdkConfig::new(key, FlockEnvironment::Production),
        None => SdkConfig::from_env().map_err(|error| error.to_string())?,
    };
    if let Some(environment) = args.environment.as_deref() {
        config.environment = environment.parse::<FlockEnvironment>()?;
    }
    if let Some(api_url) = args.api_url.as_deref() {
        config.api_base_url = api_url.to_string();
    }
    if let Some(ui_url) = args.ui_url.as_deref() {
        config.ui_base_url = ui_url.to_string();
    }
    Ok(config)
}

fn parse_query(pairs: &[String]) -> Result<Option<QueryParams>, String> {
    if pairs.is_empty() {
        return Ok(None);
    }
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| format!("query parameter '{pair}' must be key=value"))
        })
        .collect::<Result<QueryParams, String>>()
        .map(Some)
}

fn print_outcome(outcome: &PresentOutcome) {
    match outcome {
        PresentOutcome::Presented { bridge_id, url } => {
            println!("outcome: presented bridge={bridge_id} url={url}");
        }
        PresentOutcome::Navigated { placement_id } => {
            println!("outcome: navigated placement={placement_id}");
        }
        PresentOutcome::Queued => println!("outcome: queued"),
        PresentOutcome::Skipped(error) => println!("outcome: skipped ({error})"),
    }
}

struct JsonLineEmitter;

impl EventEmitter for JsonLineEmitter {
    fn emit(&self, event: SessionEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(error) => {
                tracing::warn!(target: "flock_cli", %error, "failed to encode session event");
            }
        }
    }
}

/// Prints every surface call as a JSON line instead of driving a web view.
#[derive(Default)]
struct HeadlessSurfaceFactory {
    next_id: AtomicU64,
}

impl SurfaceFactory for HeadlessSurfaceFactory {
    fn create_surface(&self) -> Arc<dyn WebSurface> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(HeadlessSurface { id })
    }
}

struct HeadlessSurface {
    id: u64,
}

impl HeadlessSurface {
    fn print(&self, call: &str, detail: Value) {
        println!("{}", json!({ "surface": self.id, "call": call, "detail": detail }));
    }
}

impl WebSurface for HeadlessSurface {
    fn load_url(&self, url: &Url) {
        self.print("load_url", json!(url.as_str()));
    }

    fn set_background_color(&self, color: Rgba) {
        self.print("set_background_color", json!(color.to_hex()));
    }

    fn add_user_script(&self, script: &str) {
        self.print("add_user_script", json!(script.len()));
    }

    fn evaluate_script(&self, script: &str) {
        self.print("evaluate_script", json!(script));
    }

    fn register_message_handler(&self, name: &str) {
        self.print("register_message_handler", json!(name));
    }

    fn unregister_message_handler(&self, name: &str) {
        self.print("unregister_message_handler", json!(name));
    }

    fn teardown(&self) {
        self.print("teardown", Value::Null);
    }
}
