use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paygate::application::gateway::Gateway;
use paygate::config::GatewayConfig;
use paygate::domain::policy::Policies;
use paygate::error::PaymentError;
use paygate::infrastructure::in_memory::InMemoryStore;
use paygate::interfaces::csv::merchant_reader::MerchantReader;
use paygate::interfaces::csv::request_reader::{Request, RequestReader};
use paygate::interfaces::csv::summary_writer::SummaryWriter;
use paygate::telemetry::{LogFormat, init_tracing};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input requests CSV file
    input: PathBuf,

    /// Merchant registry CSV file
    #[arg(long)]
    merchants: PathBuf,

    /// Skip simulated processing delays
    #[arg(long)]
    instant: bool,

    /// Never flag fraud, always settle and always approve refunds
    #[arg(long)]
    deterministic: bool,
}

async fn refund_latest(
    gateway: &Gateway,
    merchant_id: &str,
    order_id: &str,
    amount: Decimal,
) -> paygate::error::Result<()> {
    // Refunds need the payment settled first.
    gateway.wait_idle().await;
    let tx = gateway
        .list_transactions(merchant_id)
        .await?
        .into_iter()
        .rev()
        .find(|tx| tx.order_id == order_id)
        .ok_or_else(|| {
            PaymentError::NotFound(format!("No transaction for order {merchant_id}/{order_id}"))
        })?;
    gateway.initiate_refund(&tx.transaction_id, amount, None).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(LogFormat::from_env());

    let config = if cli.instant {
        GatewayConfig::instant()
    } else {
        GatewayConfig::from_env().into_diagnostic()?
    };

    let store = InMemoryStore::new();
    let file = File::open(&cli.merchants).into_diagnostic()?;
    for merchant in MerchantReader::new(file).merchants() {
        match merchant {
            Ok(merchant) => store.register_merchant(merchant).await,
            Err(e) => eprintln!("Error reading merchant: {}", e),
        }
    }

    let mut builder = Gateway::builder(config).store(store);
    if cli.deterministic {
        builder = builder.policies(Policies::deterministic());
    }
    let gateway = builder.start().into_diagnostic()?;

    let file = File::open(&cli.input).into_diagnostic()?;
    for request in RequestReader::new(file).requests() {
        let result = match request {
            Ok(Request::Payment(payment)) => gateway.create_payment(payment).await.map(|_| ()),
            Ok(Request::Refund {
                merchant_id,
                order_id,
                amount,
            }) => refund_latest(&gateway, &merchant_id, &order_id, amount).await,
            Err(e) => {
                eprintln!("Error reading request: {}", e);
                continue;
            }
        };
        if let Err(e) = result {
            eprintln!("Error processing request: {}", e);
        }
    }

    gateway.wait_idle().await;

    let mut statements = Vec::new();
    for merchant in gateway.merchants().await.into_diagnostic()? {
        statements.push(gateway.ledger().statement(&merchant.merchant_id).await.into_diagnostic()?);
    }
    let stdout = io::stdout();
    let mut writer = SummaryWriter::new(stdout.lock());
    writer.write_statements(statements).into_diagnostic()?;

    gateway.shutdown().await;
    Ok(())
}
