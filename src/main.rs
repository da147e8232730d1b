#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mediashare_lib::run().await
}
