use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for a ledger coordinator or miner node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, default_value = "http://127.0.0.1:8080", global = true)]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transfer
    Submit {
        /// Sender
        #[arg(long)]
        from: String,
        /// Recipient
        #[arg(long)]
        to: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Ask the coordinator's faucet for coins
    Faucet {
        #[arg(long)]
        address: String,
    },
    /// Replayed balance of an address
    Balance { address: String },
    /// Balances of every address on the chain
    Balances,
    /// Full chain
    Chain,
    /// Tip of the chain
    Head,
    /// Faucet and mining-reward totals
    Details,
    /// Pending pool
    Pending,
}

#[derive(Serialize)]
struct Transfer {
    from: String,
    to: String,
    amount: u64,
}

#[derive(Serialize)]
struct FaucetRequest {
    address: String,
}

struct NodeClient {
    base: String,
    http: reqwest::Client,
}

impl NodeClient {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base);
        debug!(%url, "GET");
        let res = self.http.get(&url).send().await.with_context(|| format!("GET {url}"))?;
        read_body(res).await
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        let url = format!("{}{path}", self.base);
        debug!(%url, "POST");
        let res = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        read_body(res).await
    }
}

async fn read_body(res: reqwest::Response) -> Result<Value> {
    let status = res.status();
    let body: Value = res.json().await.context("node returned a non-JSON body")?;
    if !status.is_success() {
        let reason = body["error"].as_str().unwrap_or("unknown error");
        anyhow::bail!("node answered {status}: {reason}");
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = NodeClient::new(&cli.node);
    let body = match cli.cmd {
        Command::Submit { from, to, amount } => {
            client
                .post("/transaction", &Transfer { from, to, amount })
                .await?
        }
        Command::Faucet { address } => client.post("/faucet", &FaucetRequest { address }).await?,
        Command::Balance { address } => client.get(&format!("/balance/{address}")).await?,
        Command::Balances => client.get("/balances").await?,
        Command::Chain => client.get("/blockchain").await?,
        Command::Head => client.get("/chain/head").await?,
        Command::Details => client.get("/blockchain-details").await?,
        Command::Pending => client.get("/pending-transactions").await?,
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
