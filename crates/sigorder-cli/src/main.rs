//! `sigorder` command line: relay health, hash status and message encoding.

mod logging;

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use sigorder_confirm::ClientConfig;
use sigorder_message::{
    build_order_message, AuctionParams, Direction, OrderParams, OrderType, SignedOrderParams, TakerInfo,
    DEFAULT_SIGNING_BUFFER,
};
use sigorder_relay::{PollStatus, RelayClient, RelayConfig};
use sigorder_types::{MarketType, Pubkey, Result, SigOrderError};
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "sigorder")]
#[command(about = "Signed-message order tooling", long_about = None)]
struct Cli {
    /// Debug logging for the sigorder crates
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Relay base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    relay_url: String,

    /// JSON client config; overrides --relay-url
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the relay answers its health endpoint
    Health,

    /// Query the relay once for a submission hash
    Status {
        /// base64(sha256(signature))
        hash: String,
    },

    /// Build an order message and print its canonical hex
    Encode {
        #[arg(long)]
        taker: String,
        #[arg(long, default_value_t = 0)]
        sub_account: u16,
        /// Build the delegate variant naming the taker account
        #[arg(long)]
        delegate: bool,
        #[arg(long, value_enum, default_value_t = CliMarket::Perp)]
        market: CliMarket,
        #[arg(long, default_value_t = 0)]
        market_index: u16,
        #[arg(long, value_enum)]
        direction: CliDirection,
        #[arg(long)]
        amount: u64,
        /// Limit price; omit for a market order
        #[arg(long)]
        price: Option<u64>,
        #[arg(long, default_value_t = 0)]
        auction_slots: u8,
        #[arg(long)]
        auction_start: Option<i64>,
        #[arg(long)]
        auction_end: Option<i64>,
        #[arg(long)]
        current_slot: u64,
        #[arg(long, default_value_t = DEFAULT_SIGNING_BUFFER)]
        signing_buffer: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMarket {
    Perp,
    Spot,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliDirection {
    Long,
    Short,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.cmd {
        Commands::Health => {
            let relay = relay_client(cli.config.as_deref(), &cli.relay_url)?;
            let healthy = relay.health_check().await;
            println!("{}", json!({ "relay": relay.base_url(), "healthy": healthy }));
            if !healthy {
                return Err(SigOrderError::Transport("relay is not healthy".into()));
            }
        }
        Commands::Status { hash } => {
            let relay = relay_client(cli.config.as_deref(), &cli.relay_url)?;
            let report = match relay.poll_status(&hash).await {
                PollStatus::Landed(id) => json!({ "hash": hash, "status": "landed", "landed_id": id }),
                PollStatus::Pending => json!({ "hash": hash, "status": "pending" }),
                PollStatus::Unavailable(reason) => {
                    json!({ "hash": hash, "status": "unavailable", "reason": reason })
                }
            };
            println!("{}", report);
        }
        Commands::Encode {
            taker,
            sub_account,
            delegate,
            market,
            market_index,
            direction,
            amount,
            price,
            auction_slots,
            auction_start,
            auction_end,
            current_slot,
            signing_buffer,
        } => {
            let taker = TakerInfo {
                address: taker.parse::<Pubkey>()?,
                sub_account_id: sub_account,
                is_delegate: delegate,
            };
            let auction = (auction_slots > 0).then(|| AuctionParams {
                duration_slots: auction_slots,
                start_price: auction_start.unwrap_or(0),
                end_price: auction_end.unwrap_or(0),
            });
            let params = SignedOrderParams {
                main: OrderParams {
                    order_type: if price.is_some() { OrderType::Limit } else { OrderType::Market },
                    market_type: match market {
                        CliMarket::Perp => MarketType::Perp,
                        CliMarket::Spot => MarketType::Spot,
                    },
                    market_index,
                    direction: match direction {
                        CliDirection::Long => Direction::Long,
                        CliDirection::Short => Direction::Short,
                    },
                    base_asset_amount: amount,
                    price: price.unwrap_or(0),
                    reduce_only: false,
                    post_only: false,
                    trigger_price: None,
                    auction,
                    max_ts: None,
                },
                take_profit: None,
                stop_loss: None,
            };

            let built = build_order_message(&params, &taker, current_slot, signing_buffer);
            debug!(bytes = built.bytes.len(), "order message built");
            let report = json!({
                "message": built.hex,
                "correlation_id": built.correlation_id().to_string(),
                "expiry_slot": built.expiry_slot(),
                "params": params,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report).map_err(|e| SigOrderError::Other(e.to_string()))?
            );
        }
    }
    Ok(())
}

fn relay_client(config: Option<&str>, relay_url: &str) -> Result<RelayClient> {
    let relay = match config {
        Some(path) => ClientConfig::from_json_file(path)?.relay,
        None => RelayConfig::new(relay_url),
    };
    RelayClient::new(&relay)
}
