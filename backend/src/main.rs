#[tokio::main]
async fn main() {
    if let Err(e) = server::start_server().await {
        eprintln!("SafeHer backend failed: {e:#}");
        std::process::exit(1);
    }
}
