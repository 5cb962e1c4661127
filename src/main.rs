#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gabarito_rust::run().await {
        eprintln!("gabarito-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
