#[tokio::main]
async fn main() {
    if let Err(e) = rental_roi::api::run_cli().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
