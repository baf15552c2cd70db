//! CLI binary driving the cluster-join handshake from deployment
//! pipelines.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use cidr::Ipv4Cidr;
use clap::{Parser, Subcommand};
use muster_api::K3sApi;
use muster_channel::PublicationChannel;
use muster_channel_fs::{DEFAULT_DROP_DIR, FsChannel};
use muster_channel_scan::ScanChannel;
use muster_collector::{CollectOptions, Collector};
use muster_handshake::{AgentHandshake, HandshakeReport, ServerFacts, ServerHandshake};
use muster_host::{PackageLockMitigation, SystemdManager};
use muster_join::{JoinOptions, JoinOrchestrator, K3sInstaller};
use muster_readiness::{ReadinessVerifier, VerifyOptions};
use muster_remote::SshRemote;
use muster_verify::MembershipVerifier;
use tracing::info;
use url::Url;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Cluster API client could not be built
    #[error("api error: {0}")]
    Api(#[from] muster_api::Error),

    /// File-drop channel error
    #[error("channel error: {0}")]
    Channel(#[from] muster_channel_fs::Error),

    /// A handshake step failed
    #[error(transparent)]
    Handshake(#[from] muster_handshake::Error),

    /// Report serialization error
    #[error("report serialization error: {0}")]
    Report(#[from] serde_json::Error),

    /// Membership verification failed
    #[error(transparent)]
    Verify(#[from] muster_verify::Error),
}

#[derive(Debug, Parser)]
#[command(name = "muster", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify this server's readiness, then publish its join credential
    Server(ServerArgs),
    /// Collect a join credential, then join this node to the cluster
    Agent(AgentArgs),
    /// Check that the expected number of nodes joined
    Verify(VerifyArgs),
}

#[derive(Debug, Parser)]
struct ServerArgs {
    /// Cluster this server belongs to
    #[arg(long, env = "MUSTER_CLUSTER_NAME")]
    cluster_name: String,

    /// This node's hostname
    #[arg(long, env = "MUSTER_NODE_NAME")]
    node_name: String,

    /// Address agents reach this server on
    #[arg(long, env = "MUSTER_SERVER_IP")]
    server_ip: IpAddr,

    /// API endpoint agents join against
    #[arg(long, env = "MUSTER_SERVER_URL")]
    server_url: Url,

    /// FQDN to advertise (defaults to the node name)
    #[arg(long)]
    server_fqdn: Option<String>,

    /// Mark this server as a secondary member of an HA set
    #[arg(long)]
    secondary: bool,

    /// Where the credential generator writes the token
    #[arg(long, default_value = "/var/lib/rancher/k3s/server/node-token")]
    token_path: PathBuf,

    /// Readiness budget in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Server service unit to watch
    #[arg(long, default_value = "k3s")]
    service_unit: String,

    /// Directory the credential record is dropped into
    #[arg(long, default_value = DEFAULT_DROP_DIR, env = "MUSTER_DROP_DIR")]
    drop_dir: PathBuf,
}

#[derive(Debug, Parser)]
struct AgentArgs {
    /// Cluster to join
    #[arg(long, env = "MUSTER_CLUSTER_NAME")]
    cluster_name: String,

    /// This node's hostname
    #[arg(long, env = "MUSTER_NODE_NAME")]
    node_name: String,

    /// Directory the credential record is dropped into
    #[arg(long, default_value = DEFAULT_DROP_DIR, env = "MUSTER_DROP_DIR")]
    drop_dir: PathBuf,

    /// Scan this subnet for the credential instead of reading the local
    /// drop directory
    #[arg(long)]
    scan_subnet: Option<Ipv4Cidr>,

    /// API port probed while scanning
    #[arg(long, default_value_t = 6443)]
    api_port: u16,

    /// SSH user for scan retrieval
    #[arg(long, default_value = "root")]
    ssh_user: String,

    /// SSH identity file for scan retrieval
    #[arg(long)]
    ssh_identity: Option<PathBuf>,

    /// Collection budget in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Proceed without joining when no credential appears in time
    #[arg(long)]
    optional: bool,

    /// Where to record the collection outcome
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Agent version passed to the installer
    #[arg(long, env = "MUSTER_K3S_VERSION")]
    agent_version: Option<String>,

    /// Installer script path
    #[arg(long, default_value = "/usr/local/bin/k3s-install.sh")]
    install_script: PathBuf,

    /// Maximum join attempts
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Skip stopping package-manager units and clearing their locks
    #[arg(long)]
    skip_lock_mitigation: bool,
}

#[derive(Debug, Parser)]
struct VerifyArgs {
    /// API endpoint of the cluster
    #[arg(long, env = "MUSTER_SERVER_URL")]
    server_url: Url,

    /// Credential used to list nodes
    #[arg(long, env = "MUSTER_TOKEN", hide_env_values = true)]
    token: String,

    /// Minimum number of ready nodes expected
    #[arg(long)]
    expected_nodes: usize,

    /// Agent host to pull logs from when the cluster comes up short
    /// (repeatable)
    #[arg(long = "agent-host")]
    agent_hosts: Vec<String>,

    /// SSH user for log retrieval
    #[arg(long, default_value = "root")]
    ssh_user: String,

    /// SSH identity file for log retrieval
    #[arg(long)]
    ssh_identity: Option<PathBuf>,
}

fn ssh_remote(user: &str, identity: Option<&PathBuf>) -> SshRemote {
    let remote = SshRemote::new(user);
    match identity {
        Some(path) => remote.with_identity_file(path.clone()),
        None => remote,
    }
}

async fn run_server(args: ServerArgs) -> Result<(), Error> {
    let mut options = VerifyOptions::new(&args.node_name);
    options.service_unit = args.service_unit;
    options.token_path = args.token_path;
    options.timeout = Duration::from_secs(args.timeout);

    let verifier = ReadinessVerifier::new(
        SystemdManager::new(),
        K3sApi::new(args.server_url.clone())?,
        options,
    );
    let channel = FsChannel::new(args.drop_dir)?;

    let mut facts = ServerFacts::new(
        args.cluster_name,
        args.node_name,
        args.server_ip,
        args.server_url,
    );
    if let Some(fqdn) = args.server_fqdn {
        facts = facts.with_fqdn(fqdn);
    }
    if args.secondary {
        facts = facts.secondary();
    }

    let report = ServerHandshake::new(verifier, channel, facts).run().await;
    finish(report)
}

async fn run_agent(args: AgentArgs) -> Result<(), Error> {
    let mut options = CollectOptions::new(&args.cluster_name);
    options.timeout = Duration::from_secs(args.timeout);
    options.wait_for_token = !args.optional;
    options.state_path = args.state_file.clone();

    let installer = K3sInstaller::new(args.install_script.clone());
    let mut orchestrator = JoinOrchestrator::new(
        installer,
        SystemdManager::new(),
        JoinOptions {
            max_attempts: args.max_attempts,
            ..JoinOptions::default()
        },
    );
    if !args.skip_lock_mitigation {
        orchestrator = orchestrator.with_lock_mitigation(PackageLockMitigation::default());
    }

    let report = match args.scan_subnet {
        Some(subnet) => {
            let remote = ssh_remote(&args.ssh_user, args.ssh_identity.as_ref());
            let channel = ScanChannel::across_subnet(
                subnet,
                args.api_port,
                args.drop_dir.to_string_lossy().into_owned(),
                remote,
            );
            run_agent_flow(channel, orchestrator, options, &args).await
        }
        None => {
            let channel = FsChannel::new(args.drop_dir.clone())?;
            run_agent_flow(channel, orchestrator, options, &args).await
        }
    };
    finish(report)
}

async fn run_agent_flow<C: PublicationChannel>(
    channel: C,
    orchestrator: JoinOrchestrator<K3sInstaller, SystemdManager>,
    options: CollectOptions,
    args: &AgentArgs,
) -> HandshakeReport {
    let mut flow = AgentHandshake::new(
        Collector::new(channel),
        orchestrator,
        options,
        args.node_name.clone(),
    );
    if let Some(version) = &args.agent_version {
        flow = flow.with_agent_version(version);
    }
    flow.run().await
}

async fn run_verify(args: VerifyArgs) -> Result<(), Error> {
    let api = K3sApi::new(args.server_url)?;
    let verifier = MembershipVerifier::new(api)
        .with_remote(ssh_remote(&args.ssh_user, args.ssh_identity.as_ref()));

    let report = verifier
        .verify_membership(&args.token, args.expected_nodes, &args.agent_hosts)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        "cluster has {}/{} ready node(s)",
        report.ready_count(),
        report.expected_min_nodes
    );
    Ok(())
}

/// Prints the report and turns a failed step into a non-zero exit.
fn finish(report: HandshakeReport) -> Result<(), Error> {
    print!("{report}");
    report.into_result()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match args.command {
        Command::Server(args) => run_server(args).await,
        Command::Agent(args) => run_agent(args).await,
        Command::Verify(args) => run_verify(args).await,
    }
}
