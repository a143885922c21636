use std::sync::Arc;

use ride_hailing::api;
use ride_hailing::config::{Config, LogFormat};
use ride_hailing::error::AppError;
use ride_hailing::gateway::SslCommerzGateway;
use ride_hailing::models::account::{Account, Role};
use ride_hailing::state::{AppState, PaymentSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let gateway = SslCommerzGateway::new(&config.gateway)?;
    let payment_settings =
        PaymentSettings::new(config.payment_currency.clone(), &config.public_base_url);
    let shared_state = Arc::new(AppState::new(
        Arc::new(gateway),
        payment_settings,
        config.event_buffer_size,
    ));

    seed_admin(&shared_state, &config.admin_email)?;

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        gateway = %config.gateway.base_url,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn seed_admin(state: &AppState, email: &str) -> Result<(), AppError> {
    if let Some(existing) = state.accounts.find_by_email(email) {
        tracing::info!(account_id = %existing.id, "admin account present");
        return Ok(());
    }

    let admin = state.accounts.insert(Account::new(
        "Administrator".to_string(),
        email.to_string(),
        None,
        Role::Admin,
    ))?;
    tracing::info!(account_id = %admin.id, email = %admin.email, "admin account seeded");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
