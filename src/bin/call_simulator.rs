use anyhow::{bail, Context};

use seat_reservation::simulator::{seat_no_from_arg, Endpoint, SimulatorClient};

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut endpoint = Endpoint::BookExisting;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--claim" => endpoint = Endpoint::Claim,
            _ => positional.push(arg),
        }
    }

    let Some((seat_arg, names)) = positional.split_first() else {
        bail!("usage: call_simulator <seat-no> <name>... [--claim]");
    };
    if names.is_empty() {
        bail!("at least one booker name is required");
    }

    let base_url =
        std::env::var("SIMULATOR_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let client = SimulatorClient::new(&base_url).context("failed to build HTTP client")?;
    let seat_no = seat_no_from_arg(seat_arg);

    for result in client.race(&seat_no, names, endpoint).await {
        match result {
            Ok(call) if call.success => println!(
                "✅ Seat {} successfully booked by {}",
                seat_arg, call.name_of_booker
            ),
            Ok(call) => eprintln!(
                "❌ Failed to book seat {} for {}: {} ({})",
                seat_arg, call.name_of_booker, call.message, call.status
            ),
            Err(e) => eprintln!("❌ Request to {} failed: {}", base_url, e),
        }
    }
    Ok(())
}
