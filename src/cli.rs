use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::chain::types::{BlockHeader, HashOrNumber, H256};
use crate::chain::{Chain, ChainOracle};
use crate::config::ClientConfig;
use crate::network::connection::{dial, dial_with_newest_generation, Connection};
use crate::network::message::{GetBlockHeaders, Message};
use crate::network::serve::RequestMode;
use crate::network::transport::SecureChannel;
use crate::utils::init_logging;

/// Conformance client for eth wire protocol nodes.
#[derive(Debug, Parser)]
#[clap(name = "eth-conformance", version)]
pub struct Cli {
    /// Path to a TOML client config
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[clap(long, global = true, default_value = "info")]
    pub log_level: String,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Exchange Hello messages and print what the node advertises
    Ping {
        /// enode://<id>@<host>:<port>
        #[clap(long)]
        node: String,
    },
    /// Handshake and validate the node's status against a chain file
    Status {
        #[clap(long)]
        node: String,

        /// JSON chain file
        #[clap(long)]
        chain: PathBuf,

        /// also advertise eth/66
        #[clap(long)]
        eth66: bool,
    },
    /// Request headers and compare them with the chain file
    Headers {
        #[clap(long)]
        node: String,

        #[clap(long)]
        chain: PathBuf,

        /// block hash (0x-prefixed) or number
        #[clap(long)]
        origin: HashOrNumber,

        #[clap(long, default_value_t = 1)]
        amount: u64,

        #[clap(long, default_value_t = 0)]
        skip: u64,

        #[clap(long)]
        reverse: bool,

        #[clap(long)]
        eth66: bool,

        /// request id for eth/66 requests
        #[clap(long, requires = "eth66")]
        request_id: Option<u64>,
    },
    /// Request the bodies of a run of blocks and compare them with the chain file
    Bodies {
        #[clap(long)]
        node: String,

        #[clap(long)]
        chain: PathBuf,

        /// first block, by hash (0x-prefixed) or number
        #[clap(long)]
        origin: HashOrNumber,

        #[clap(long, default_value_t = 1)]
        amount: u64,

        #[clap(long)]
        eth66: bool,

        #[clap(long, requires = "eth66")]
        request_id: Option<u64>,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    run(cli).await
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };

    match cli.cmd {
        Cmd::Ping { node } => {
            let mut conn = dial(&node, config).await.context("dial failed")?;
            match conn.exchange_hello().await? {
                Message::Hello(hello) => {
                    let caps: Vec<String> = hello.caps.iter().map(ToString::to_string).collect();
                    println!("{} (p2p v{}) caps: {}", hello.name, hello.version, caps.join(", "));
                }
                Message::Disconnect(msg) => println!("node disconnected: {}", msg.reason),
                other => bail!("unexpected reply to hello: {}", other.name()),
            }
            conn.close().await?;
            Ok(())
        }
        Cmd::Status { node, chain, eth66 } => {
            let chain = load_chain(&chain)?;
            let mut conn = connect(&node, config, eth66).await?;
            let status = conn.perform_handshake_and_status(&chain, None).await?;
            println!(
                "status ok: eth/{} network {} head {} td {}",
                conn.negotiated_version(),
                status.network_id,
                status.head,
                status.td
            );
            conn.close().await?;
            Ok(())
        }
        Cmd::Headers { node, chain, origin, amount, skip, reverse, eth66, request_id } => {
            let chain = load_chain(&chain)?;
            let request = GetBlockHeaders { origin, amount, skip, reverse };
            let mut conn = connect(&node, config, eth66).await?;
            conn.perform_handshake_and_status(&chain, None).await?;
            let checked = check_headers(&mut conn, &chain, &request, request_mode(eth66, request_id)).await;
            conn.close().await?;
            println!("headers match: {} headers", checked?);
            Ok(())
        }
        Cmd::Bodies { node, chain, origin, amount, eth66, request_id } => {
            let chain = load_chain(&chain)?;
            let request = GetBlockHeaders { origin, amount, skip: 0, reverse: false };
            let mut conn = connect(&node, config, eth66).await?;
            conn.perform_handshake_and_status(&chain, None).await?;
            let checked = check_bodies(&mut conn, &chain, &request, request_mode(eth66, request_id)).await;
            conn.close().await?;
            println!("bodies match: {} bodies", checked?);
            Ok(())
        }
    }
}

fn request_mode(eth66: bool, request_id: Option<u64>) -> RequestMode {
    if eth66 {
        RequestMode::Correlated(request_id.unwrap_or(1))
    } else {
        RequestMode::Legacy
    }
}

/// Ask the peer for `request` and compare with the reference chain's answer.
async fn check_headers<C: SecureChannel>(
    conn: &mut Connection<C>,
    chain: &Chain,
    request: &GetBlockHeaders,
    mode: RequestMode,
) -> Result<usize> {
    let expected = chain.get_headers(request).context("reference chain cannot answer")?;
    let headers = conn.headers_request(request, chain, mode).await?;
    if headers != expected {
        bail!(
            "header mismatch: got {} headers, want {} ({:?})",
            headers.len(),
            expected.len(),
            headers.iter().map(|h| h.number).collect::<Vec<_>>()
        );
    }
    Ok(headers.len())
}

/// Ask the peer for the bodies of the blocks `request` selects on the reference
/// chain and compare with the bodies stored there.
async fn check_bodies<C: SecureChannel>(
    conn: &mut Connection<C>,
    chain: &Chain,
    request: &GetBlockHeaders,
    mode: RequestMode,
) -> Result<usize> {
    let hashes: Vec<H256> = chain
        .get_headers(request)
        .context("reference chain cannot resolve the blocks")?
        .iter()
        .map(BlockHeader::hash)
        .collect();
    let expected = chain.get_bodies(&hashes);
    let bodies = conn.bodies_request(&hashes, chain, mode).await?;
    if bodies != expected {
        bail!("body mismatch: got {} bodies for {} blocks, want {}", bodies.len(), hashes.len(), expected.len());
    }
    Ok(bodies.len())
}

fn load_chain(path: &Path) -> Result<Chain> {
    Chain::load(path).with_context(|| format!("loading chain {}", path.display()))
}

async fn connect(node: &str, config: ClientConfig, eth66: bool) -> Result<Connection> {
    let conn = if eth66 {
        dial_with_newest_generation(node, config).await
    } else {
        dial(node, config).await
    };
    conn.context("dial failed")
}
