//! QC Account Control Service
//!
//! Run modes:
//!   account-control serve          - REST API, event feed and keeper loop
//!   account-control check-config   - validate and print configuration
//!
//! The keeper runs inside the serving process so that a single process
//! owns the state store.
//!
//! Configuration comes from `ACCOUNT_CONTROL_*` environment variables (a
//! `.env` file is loaded when present).

use account_control::access::Role;
use account_control::api;
use account_control::common::{init_from_config, ProtocolConfig};
use account_control::spv::{NetworkAddressDecoder, StaticHeaderRelay};
use account_control::token::InMemoryToken;
use account_control::{
    Collaborators, Keeper, MemoryStateStore, Protocol, ProtocolService, SqliteStateStore,
    StateStore, SystemClock,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "account-control")]
#[command(about = "Custodian reserve accounting for a wrapped Bitcoin token")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server with the keeper in the background
    Serve {
        /// HTTP port (overrides ACCOUNT_CONTROL_API_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not start the keeper loop
        #[arg(long)]
        no_keeper: bool,
    },

    /// Validate configuration and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = ProtocolConfig::from_env()?;
    config.validate()?;

    match cli.command {
        Commands::CheckConfig => {
            config.print_summary();
            Ok(())
        }
        Commands::Serve { port, no_keeper } => {
            init_from_config(&config)?;
            let service = build_service(&config).await?;

            if !no_keeper {
                let keeper = Keeper::new(
                    service.clone(),
                    config.keeper,
                    config.keeper_interval_secs,
                );
                tokio::spawn(async move { keeper.run().await });
            }

            let port = port.unwrap_or(config.api_port);
            api::start_server(service, port).await?;
            Ok(())
        }
    }
}

/// Open the store, resume persisted state or bootstrap a fresh protocol
async fn build_service(
    config: &ProtocolConfig,
) -> Result<ProtocolService, Box<dyn std::error::Error>> {
    let store: Arc<dyn StateStore> = match &config.db_path {
        Some(path) => {
            info!(path = %path, "Using SQLite state store");
            Arc::new(SqliteStateStore::new(path)?)
        }
        None => {
            info!("Using in-memory state store");
            Arc::new(MemoryStateStore::new())
        }
    };

    let collaborators = Collaborators {
        token: Box::new(InMemoryToken::new()),
        relay: Arc::new(StaticHeaderRelay::new(
            config.current_epoch_difficulty,
            config.previous_epoch_difficulty,
        )),
        decoder: Arc::new(NetworkAddressDecoder::new(config.network.bitcoin_network())),
    };

    let (protocol, fresh) = match store.load_state().await? {
        Some(state) => {
            info!("Resuming persisted protocol state");
            (Protocol::from_state(state, collaborators), false)
        }
        None => {
            info!(owner = %config.owner, "Bootstrapping new protocol state");
            (
                Protocol::new(config.owner, config.protocol_params(), collaborators),
                true,
            )
        }
    };

    let service = ProtocolService::new(protocol, Arc::new(SystemClock), Some(store));

    if fresh {
        let keeper = config.keeper;
        let has_role = service.read(|p, _| p.has_role(Role::Arbiter, &keeper)).await;
        if !has_role {
            if let Err(e) = service
                .execute(config.owner, |p, ctx| p.grant_role(ctx, Role::Arbiter, keeper))
                .await
            {
                error!(code = e.code(), error = %e, "Failed to grant keeper the arbiter role");
                return Err(e.into());
            }
            info!(keeper = %keeper, "Keeper granted arbiter role");
        }
    }

    Ok(service)
}
