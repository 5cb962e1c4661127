#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gabarito_rust::run_scanner().await {
        eprintln!("gabarito-scanner fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
