use anyhow::{Context, Result};
use contact_relay::{
    api::{self, AppState},
    init_db, load, LocalIpv4Lookup, SmtpEmailSender, SqliteStore, SubmissionHandler,
    TwilioSmsSender,
};
use reqwest::Client;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Priority: RUST_LOG env -> fallback to "info"
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .compact()
        .init();

    info!("contact-relay starting...");

    // 1) Load config
    let cfg = load().context("Failed to load config")?;

    // 2) Init DB
    let conn = init_db(&cfg.database.path)?;
    let store = Arc::new(SqliteStore::new(conn));

    // 3) Prepare senders
    let email = Arc::new(SmtpEmailSender::new(&cfg.smtp).context("Failed to build SMTP sender")?);
    let http = Client::builder().user_agent("contact-relay/0.1").build()?;
    let sms = Arc::new(TwilioSmsSender::new(http, cfg.twilio.clone()));

    // 4) Wire handler and serve
    let handler = SubmissionHandler::new(store, Arc::new(LocalIpv4Lookup::default()), email, sms);
    let state = Arc::new(AppState { handler: Arc::new(handler) });
    api::serve(&cfg.server.bind, state).await
}
