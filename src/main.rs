#[tokio::main]
async fn main() {
    if let Err(e) = detection_overlay_lib::run().await {
        tracing::error!(error = %e, "detection overlay exited with an error");
        std::process::exit(1);
    }
}
