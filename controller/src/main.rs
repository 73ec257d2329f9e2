#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    fanpilot_controller::host::run().await
}
