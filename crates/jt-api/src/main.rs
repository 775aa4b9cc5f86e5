#[tokio::main]
async fn main() {
    if let Err(err) = jt_api::run().await {
        tracing::error!(error = %err, "jt-api failed");
        std::process::exit(1);
    }
}
