use crate::api;
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use tracing::info;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            session_ttl,
        } => {
            // Validate the DSN up front and keep credentials out of the logs.
            let parsed = Url::parse(&dsn).context("invalid database DSN")?;
            info!(
                host = parsed.host_str().unwrap_or("unknown"),
                database = parsed.path().trim_start_matches('/'),
                "starting server on port {port}"
            );

            api::serve(port, &dsn, session_ttl).await?;
        }
    }

    Ok(())
}
