#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kgetl::run_cli().await
}
