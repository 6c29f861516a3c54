//! policy-reco CLI
//!
//! Entry point for the `policy-reco` command-line tool.

use std::io;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand};
use policy_reco::config::EffectiveConfig;
use policy_reco::signal::SignalHandler;
use policy_reco::{
    parse_job_id, ClickHouseHttp, Kubectl, Pipeline, PipelineResult, RetrievalOptions, RunOptions,
};
use reco_params::RawParams;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "policy-reco")]
#[command(about = "Run and inspect network policy recommendation jobs", version)]
struct Cli {
    /// Path to the kubeconfig used by kubectl
    #[arg(long, global = true)]
    kubeconfig: Option<String>,

    /// Namespace of the analytics stack (default: flow-visibility)
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Config file (default: $POLICY_RECO_CONFIG or ~/.config/policy-reco/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new policy recommendation job
    Run(RunArgs),

    /// Show the status of a policy recommendation job
    Status {
        /// ID of the job
        #[arg(long)]
        id: String,

        /// Print state and job arguments as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve the result of a policy recommendation job
    Retrieve {
        /// ID of the job
        #[arg(long)]
        id: String,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// {initial|subsequent} Whether this is an initial or a subsequent recommendation
    #[arg(long = "type", short = 't', default_value = "initial")]
    reco_type: String,

    /// Maximum number of flow records read from the database; 0 means no limit
    #[arg(long, short = 'l', default_value_t = 0, allow_negative_numbers = true)]
    limit: i64,

    /// Network isolation preference: anp-deny-applied, anp-deny-all or k8s-np
    #[arg(long, short = 'o', default_value = "anp-deny-applied")]
    option: String,

    /// Start of the flow records considered, "YYYY-MM-DD hh:mm:ss" in UTC
    #[arg(long, short = 's', default_value = "")]
    start_time: String,

    /// End of the flow records considered, "YYYY-MM-DD hh:mm:ss" in UTC
    #[arg(long, short = 'e', default_value = "")]
    end_time: String,

    /// JSON list of namespaces whose traffic is allowed,
    /// e.g. '["kube-system","flow-aggregator","flow-visibility"]'
    #[arg(long, short = 'n', default_value = "")]
    ns_allow_list: String,

    /// Drop auto-generated Pod labels (pod-template-hash, controller-revision-hash, pod-template-generation)
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    rm_labels: bool,

    /// Use Service selectors in recommended policies where possible
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    to_services: bool,

    /// Number of Spark executors
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    executor_instances: i64,

    /// CPU request of the Spark driver, e.g. 200m
    #[arg(long, default_value = "200m")]
    driver_core_request: String,

    /// Memory of the Spark driver, e.g. 512M
    #[arg(long, default_value = "512M")]
    driver_memory: String,

    /// CPU request of each Spark executor
    #[arg(long, default_value = "200m")]
    executor_core_request: String,

    /// Memory of each Spark executor
    #[arg(long, default_value = "512M")]
    executor_memory: String,

    /// Wait for the job to finish and retrieve its result
    #[arg(long)]
    wait: bool,

    #[command(flatten)]
    retrieval: RetrievalArgs,
}

impl RunArgs {
    fn raw_params(&self) -> RawParams {
        RawParams {
            reco_type: self.reco_type.clone(),
            limit: self.limit,
            option: self.option.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            ns_allow_list: self.ns_allow_list.clone(),
            rm_labels: self.rm_labels,
            to_services: self.to_services,
            executor_instances: self.executor_instances,
            driver_core_request: self.driver_core_request.clone(),
            driver_memory: self.driver_memory.clone(),
            executor_core_request: self.executor_core_request.clone(),
            executor_memory: self.executor_memory.clone(),
        }
    }
}

#[derive(Args)]
struct RetrievalArgs {
    /// ClickHouse HTTP endpoint to query instead of an in-cluster route
    #[arg(long)]
    clickhouse_endpoint: Option<String>,

    /// Reach ClickHouse through its Service cluster IP instead of a port-forward
    #[arg(long)]
    use_cluster_ip: bool,

    /// Write the result to this file instead of stdout
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,
}

impl RetrievalArgs {
    fn options(&self) -> RetrievalOptions {
        RetrievalOptions {
            endpoint: self.clickhouse_endpoint.clone(),
            use_cluster_ip: self.use_cluster_ip,
            output: self.file.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn execute(cli: Cli) -> PipelineResult<()> {
    let overrides = serde_json::json!({
        "namespace": cli.namespace,
        "kubeconfig": cli.kubeconfig,
    });
    let user_config = EffectiveConfig::resolve_user_config(cli.config.clone())?;
    let effective = EffectiveConfig::build(user_config.as_deref(), Some(overrides))?;
    let settings = effective.settings()?;

    let signals = SignalHandler::new();
    if let Err(e) = signals.install() {
        tracing::warn!("could not install signal handler: {}", e);
    }

    let kubectl = Kubectl::new(settings.kubectl.clone(), settings.kubeconfig.clone())
        .with_signal_state(signals.state());
    let store = ClickHouseHttp::new(settings.store.database.clone(), settings.store.query_timeout());
    let pipeline = Pipeline::new(&kubectl, &store, settings).with_cancellation(signals.state());

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Run(args) => {
            let options = RunOptions {
                wait: args.wait,
                retrieval: args.retrieval.options(),
            };
            pipeline.run(&args.raw_params(), &options, &mut out)?;
        }
        Commands::Status { id, json } => {
            let job_id = parse_job_id(&id)?;
            pipeline.status(job_id, json, &mut out)?;
        }
        Commands::Retrieve { id, retrieval } => {
            let job_id = parse_job_id(&id)?;
            pipeline.retrieve(job_id, &retrieval.options(), &mut out)?;
        }
    }
    Ok(())
}
