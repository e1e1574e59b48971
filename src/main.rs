use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;

/// Browser-based editor for web-scraping jobs: pre-extraction actions,
/// OCR regions, CSS selectors, and Telegram notification templates.
#[derive(Parser)]
#[command(name = "jobforge", version)]
struct Args {
    /// Port for the editor UI (falls back to the next free port).
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Automation backend base URL. Defaults to $JOBFORGE_BACKEND, then
    /// the backend's usual local address.
    #[arg(long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();
    let backend = args
        .backend
        .or_else(|| std::env::var("JOBFORGE_BACKEND").ok())
        .unwrap_or_else(|| "http://127.0.0.1:5000".to_string());

    eprintln!("[Jobforge] Starting job editor...");
    jobforge::face::serve(args.port, backend).await
}
