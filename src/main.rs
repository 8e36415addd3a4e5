use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cloud_lb_controller::cloud::{DryRun, NlbApi, RpcClient, SlbApi};
use cloud_lb_controller::config::CloudConfig;
use cloud_lb_controller::controller::{self, ControllerState};
use cloud_lb_controller::render::{self, Manifests};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller
    Run(RunArgs),
    /// Print the desired load balancer model of one Service
    Render(RenderArgs),
    /// Show version and build information
    Version,
}

#[derive(Parser, Debug)]
struct CloudArgs {
    /// Cloud configuration file (YAML or JSON)
    #[arg(long, env = "CLOUD_CONFIG")]
    cloud_config: PathBuf,

    /// Override the cluster id of the configuration file
    #[arg(long, env = "CLUSTER_ID")]
    cluster_id: Option<String>,

    /// Override the region of the configuration file
    #[arg(long, env = "REGION_ID")]
    region: Option<String>,
}

impl CloudArgs {
    fn load(&self) -> anyhow::Result<CloudConfig> {
        let mut config = CloudConfig::from_file(&self.cloud_config)
            .with_context(|| format!("loading {}", self.cloud_config.display()))?;
        if let Some(cluster_id) = &self.cluster_id {
            config.cluster_id = cluster_id.clone();
        }
        if let Some(region) = &self.region {
            config.region_id = region.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    cloud: CloudArgs,

    /// Compute and log every change without touching the cloud or the cluster
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    cloud: CloudArgs,

    /// Directory of Service, Endpoints and Node manifests
    #[arg(long)]
    manifests: PathBuf,

    /// Namespace of the Service
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Name of the Service
    service: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    match args.command {
        Commands::Version => {
            println!("cloud-lb-controller v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            Ok(())
        }
        Commands::Render(render_args) => run_render(render_args).await,
        Commands::Run(run_args) => run_controller(run_args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_render(args: RenderArgs) -> anyhow::Result<()> {
    let config = Arc::new(args.cloud.load()?);
    let manifests = Manifests::load_dir(&args.manifests)?;
    let yaml = render::render(&manifests, &args.namespace, &args.service, config).await?;
    print!("{}", yaml);
    Ok(())
}

async fn run_controller(args: RunArgs) -> anyhow::Result<()> {
    info!(
        "Starting cloud-lb-controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(args.cloud.load()?);
    info!(
        "Cluster {} in region {}, vpc {}",
        config.cluster_id, config.region_id, config.vpc_id
    );

    let rpc = RpcClient::new(&config)?;
    let (slb, nlb): (Arc<dyn SlbApi>, Arc<dyn NlbApi>) = if args.dry_run {
        warn!("Dry-run mode: no cloud resource or Service status will be changed");
        (Arc::new(DryRun::new(rpc.clone())), Arc::new(DryRun::new(rpc)))
    } else {
        (Arc::new(rpc.clone()), Arc::new(rpc))
    };

    // Initialize Kubernetes client
    let client = kube::Client::try_default()
        .await
        .context("connecting to Kubernetes")?;
    info!("Connected to Kubernetes cluster");

    let state = Arc::new(ControllerState::new(client, config, slb, nlb, args.dry_run));
    controller::run_controller(state).await?;

    info!("Controller stopped");
    Ok(())
}
