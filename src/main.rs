use clap::Parser;
use enrollpay::application::engine::CheckoutEngine;
use enrollpay::config::{Cli, Command, GatewayArgs, GatewaySelection};
use enrollpay::domain::gateway::PaymentGatewayRef;
use enrollpay::domain::payment::UserId;
use enrollpay::domain::ports::{EntitlementStoreRef, PaymentLedgerRef};
use enrollpay::domain::signature::GatewaySecret;
use enrollpay::infrastructure::in_memory::{InMemoryEntitlementStore, InMemoryLedger};
use enrollpay::infrastructure::razorpay::RazorpayGateway;
#[cfg(feature = "storage-rocksdb")]
use enrollpay::infrastructure::rocksdb::RocksDBStore;
use enrollpay::infrastructure::sandbox::SandboxGateway;
use enrollpay::interfaces::csv::command_reader::CommandReader;
use enrollpay::interfaces::csv::payment_writer::PaymentWriter;
use enrollpay::interfaces::script::ScriptRunner;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal()),
        )
        .init();

    match cli.command {
        Command::Sign { order, payment } => {
            println!("{}", cli.gateway.signing_secret().sign(&order, &payment));
        }
        Command::Process { input } => {
            let (ledger, entitlements) = open_stores(cli.db_path.as_deref())?;
            let (gateway, secret, sandbox) = select_gateway(&cli.gateway)?;
            let engine = Arc::new(CheckoutEngine::new(ledger, entitlements, gateway, secret));
            let mut runner = ScriptRunner::new(engine, sandbox);

            let file = File::open(input).into_diagnostic()?;
            let reader = CommandReader::new(file);
            for (row, record) in reader.commands().enumerate() {
                match record {
                    Ok(record) => {
                        if let Err(e) = runner.run(record).await {
                            warn!(row = row + 1, "Error processing command: {}", e);
                        }
                    }
                    Err(e) => {
                        warn!(row = row + 1, "Error reading command: {}", e);
                    }
                }
            }

            let payments = runner.into_results().await?;
            let stdout = io::stdout();
            let mut writer = PaymentWriter::new(stdout.lock());
            writer.write_payments(payments)?;
        }
        Command::History { user } => {
            let (ledger, entitlements) = open_stores(cli.db_path.as_deref())?;
            let (gateway, secret, _) = select_gateway(&cli.gateway)?;
            let engine = CheckoutEngine::new(ledger, entitlements, gateway, secret);

            let history = engine.history(&UserId::parse(&user)?).await?;
            let stdout = io::stdout();
            let mut writer = PaymentWriter::new(stdout.lock());
            writer.write_history(&history)?;
        }
    }

    Ok(())
}

fn open_stores(db_path: Option<&Path>) -> Result<(PaymentLedgerRef, EntitlementStoreRef)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(path) = db_path {
        let store = Arc::new(RocksDBStore::open(path)?);
        info!(path = %path.display(), "using RocksDB storage");
        let ledger: PaymentLedgerRef = store.clone();
        let entitlements: EntitlementStoreRef = store;
        return Ok((ledger, entitlements));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    let ledger: PaymentLedgerRef = Arc::new(InMemoryLedger::new());
    let entitlements: EntitlementStoreRef = Arc::new(InMemoryEntitlementStore::new());
    Ok((ledger, entitlements))
}

fn select_gateway(
    args: &GatewayArgs,
) -> Result<(PaymentGatewayRef, GatewaySecret, Option<Arc<SandboxGateway>>)> {
    match args.selection() {
        GatewaySelection::Razorpay(config) => {
            info!(base_url = %config.base_url, "using Razorpay gateway");
            let secret = config.signing_secret();
            let gateway: PaymentGatewayRef =
                Arc::new(RazorpayGateway::new(config).into_diagnostic()?);
            Ok((gateway, secret, None))
        }
        GatewaySelection::Sandbox(secret) => {
            info!("Razorpay credentials not set, using the sandbox gateway");
            let sandbox = Arc::new(SandboxGateway::new(secret.clone()));
            let gateway: PaymentGatewayRef = sandbox.clone();
            Ok((gateway, secret, Some(sandbox)))
        }
    }
}
