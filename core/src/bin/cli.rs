/// CLI for one-shot notification commands
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    notify_core::cli_app::run(args).await
}
