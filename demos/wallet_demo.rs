use std::io::{self, Write};
use std::path::Path;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_vault::{
    ConnectionProof, FileStore, LedgerService, SessionBridge, SignedRequest, WalletConfig,
    WalletPoolStore,
};

/// Stand-in ledger that accepts every well-signed request.
struct LoggingLedger;

#[async_trait]
impl LedgerService for LoggingLedger {
    async fn connect(&self, request: SignedRequest<ConnectionProof>) -> Result<(), String> {
        if !wallet_vault::verify(&request.data.publickey, &request.data, &request.sig) {
            return Err("bad signature".to_string());
        }
        info!(address = %request.data.address, "ledger accepted connection");
        Ok(())
    }

    async fn submit_transaction(
        &self,
        request: SignedRequest<serde_json::Value>,
    ) -> Result<(), String> {
        info!(sig = %request.sig, "ledger accepted transaction");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallet_vault=info,wallet_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("Wallet Vault Demo");
    println!("=================");

    let config = match WalletConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration not found ({}), using a throwaway export secret", e);
            WalletConfig::with_secret("demo-only-secret")
        }
    };

    let store = FileStore::open(Path::new("./wallet-data")).await?;
    let pool = WalletPoolStore::from_config(store, &config);
    let bridge = SessionBridge::new(pool, LoggingLedger);

    let password = prompt_password("Enter your wallet password: ")?;

    let wallet = match bridge.pool().active().await? {
        Some(_) => {
            println!("Reconnecting existing wallet...");
            bridge.reauthenticate(&password).await?
        }
        None => {
            println!("Creating new wallet...");
            let connected = bridge
                .create_wallet(&password, |step| println!("  [{}] {:?}", step.number(), step))
                .await?;

            println!("\nIMPORTANT: store this backup string somewhere safe!");
            println!("Backup: {}\n", connected.export);
            connected.wallet
        }
    };

    println!("Address:    {}", wallet.address);
    println!("Public key: {}", wallet.pubkey);
    println!("Created:    {}", wallet.created_at);

    let tx = json!({
        "from": wallet.address,
        "to": wallet.address,
        "amount": 1,
        "timestamp": chrono::Utc::now().timestamp(),
    });
    let signed = bridge.submit_transaction(&password, &tx).await?;
    println!("Signed transaction: {}", signed.sig);

    println!("\nWallet operations completed successfully!");
    Ok(())
}

fn prompt_password(prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let password = rpassword::read_password()?;
    Ok(password)
}
