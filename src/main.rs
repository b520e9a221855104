#[tokio::main]
async fn main() {
    if let Err(e) = anemodx_lib::run().await {
        eprintln!("{} failed to start: {e}", anemodx_lib::config::APP_NAME);
        std::process::exit(1);
    }
}
