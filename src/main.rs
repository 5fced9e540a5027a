#[tokio::main]
async fn main() {
  if let Err(e) = wellness_planner_lib::run().await {
    eprintln!("wellness-planner failed: {}", e);
    std::process::exit(1);
  }
}
