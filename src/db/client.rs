use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::ConnectionSettings;
use crate::db::connection::build_config;
use crate::error::{AppError, ErrorKind};

pub type SqlClient = tiberius::Client<Compat<TcpStream>>;

/// Connect to SQL Server using resolved settings.
///
/// # Errors
///
/// Returns a `Connection` error if DNS resolution, TCP connect, or login fails, or if the
/// configured timeout elapses during connect or login. Invalid settings are a `Config` error.
pub async fn connect(settings: &ConnectionSettings) -> Result<SqlClient> {
    let config =
        build_config(settings).map_err(|err| AppError::new(ErrorKind::Config, err.to_string()))?;
    let timeout_duration = if settings.timeout_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(settings.timeout_ms))
    };

    let tcp = match timeout_duration {
        Some(duration) => timeout(duration, TcpStream::connect(config.get_addr()))
            .await
            .map_err(|_| {
                AppError::new(
                    ErrorKind::Connection,
                    format!(
                        "Connection to {}:{} timed out after {} ms",
                        settings.server, settings.port, settings.timeout_ms
                    ),
                )
            })?,
        None => TcpStream::connect(config.get_addr()).await,
    }
    .map_err(|err| {
        AppError::new(
            ErrorKind::Connection,
            format!("{}:{}: {}", settings.server, settings.port, err),
        )
    })?;
    tcp.set_nodelay(true)?;

    let client = match timeout_duration {
        Some(duration) => timeout(duration, tiberius::Client::connect(config, tcp.compat_write()))
            .await
            .map_err(|_| {
                AppError::new(
                    ErrorKind::Connection,
                    format!(
                        "Login to {} timed out after {} ms",
                        settings.database, settings.timeout_ms
                    ),
                )
            })?,
        None => tiberius::Client::connect(config, tcp.compat_write()).await,
    }
    .map_err(|err| {
        AppError::new(
            ErrorKind::Connection,
            format!("Login to {} failed: {}", settings.database, err),
        )
    })?;
    Ok(client)
}

/// Connects with the same settings but a different target database.
pub async fn connect_to(settings: &ConnectionSettings, database: &str) -> Result<SqlClient> {
    let mut settings = settings.clone();
    settings.database = database.to_string();
    connect(&settings).await
}
