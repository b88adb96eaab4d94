use fleetsheets::{
    pipeline::{self, PipelineOptions},
    sheets::GoogleSheets,
    store::ObjectStoreClient,
    Config,
};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) configuration + gateways ─────────────────────────────────
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let store = match ObjectStoreClient::s3(&cfg.s3, &cfg.bucket) {
        Ok(store) => store,
        Err(e) => {
            error!("object store: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let sheets = match GoogleSheets::connect(&cfg.sheets) {
        Ok(sheets) => sheets,
        Err(e) => {
            error!("spreadsheet: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(bucket = %cfg.bucket, spreadsheet = %sheets.spreadsheet_id(), "configured");

    // ─── 3) run ──────────────────────────────────────────────────────
    let opts = PipelineOptions::from(&cfg);
    match pipeline::run(&opts, &store, &sheets).await {
        Ok(report) if report.is_success() => {
            info!("all done");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            for (what, err) in &report.failures {
                error!(item = %what, "failed: {}", err);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("run aborted: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
