use alertscaler::{
    api::KubeAlertScales,
    approval::{record_decision, ApprovalRequest, Decision},
    config::ControllerConfig,
    crd::AlertScale,
    errors::*,
    manager::Manager,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use kube::{Client, CustomResourceExt, ResourceExt};
use log::info;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Temporarily scales Deployments and StatefulSets in response to alerts
#[derive(Parser, Debug)]
#[command(name = "alertscaler", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the controller (default)
    Run(RunArgs),
    /// Print the AlertScale CRD as YAML
    Crd,
    /// Approve an AlertScale waiting in Approvaling
    Approve(DecisionArgs),
    /// Reject an AlertScale waiting in Approvaling
    Reject(DecisionArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Controller config file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only watch this namespace
    #[arg(long)]
    namespace: Option<String>,
}

#[derive(Args, Debug)]
struct DecisionArgs {
    /// AlertScale name
    name: String,

    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Who is making the decision
    #[arg(long)]
    approver: String,

    #[arg(long)]
    reason: String,

    #[arg(long)]
    comment: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(ref e) = libmain(Cli::parse()).await {
        eprintln!("error: {}", e);
        for e in e.iter().skip(1) {
            eprintln!("caused by: {}", e);
        }
        std::process::exit(1);
    }
}

async fn libmain(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(args).await,
        Command::Crd => {
            print!("{}", serde_yaml::to_string(&AlertScale::crd())?);
            Ok(())
        }
        Command::Approve(args) => decide(Decision::Approve, args).await,
        Command::Reject(args) => decide(Decision::Reject, args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    // Read the environment to find config for kube client.
    // Note that this tries an in-cluster configuration first,
    // then falls back on a kubeconfig file.
    let client = Client::try_default().await?;

    let (_manager, drainer) = Manager::new(client, config, args.namespace).await?;
    drainer.await;
    info!("controller stopped");
    Ok(())
}

async fn decide(decision: Decision, args: DecisionArgs) -> Result<()> {
    let client = Client::try_default().await?;
    let api = KubeAlertScales::new(client);
    let request = ApprovalRequest {
        approver: args.approver,
        reason: args.reason,
        comment: args.comment,
    };
    let recorded = record_decision(
        &api,
        &args.namespace,
        &args.name,
        decision,
        &request,
        Utc::now(),
    )
    .await?;
    println!(
        "{} {}/{}",
        decision.as_str(),
        recorded.namespace().unwrap_or_default(),
        recorded.name_any()
    );
    Ok(())
}
