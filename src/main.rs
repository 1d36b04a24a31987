#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = ustoziya_rust::run().await {
        eprintln!("ustoziya-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
