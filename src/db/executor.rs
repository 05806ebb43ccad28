use anyhow::Result;
use tiberius::{Row, ToSql};

use crate::db::client::SqlClient;
use crate::error::{AppError, ErrorKind};

/// Runs a raw batch (DDL or DML) and drains every result it produces.
pub async fn execute_batch(client: &mut SqlClient, sql: &str) -> Result<()> {
    let stream = client
        .simple_query(sql)
        .await
        .map_err(|err| AppError::new(ErrorKind::Execution, err.to_string()))?;
    stream
        .into_results()
        .await
        .map_err(|err| AppError::new(ErrorKind::Execution, err.to_string()))?;
    Ok(())
}

/// Parameterised statement whose failure is a ledger failure.
pub async fn ledger_execute(
    client: &mut SqlClient,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<u64> {
    let result = client
        .execute(sql, params)
        .await
        .map_err(|err| AppError::new(ErrorKind::Ledger, err.to_string()))?;
    Ok(result.total())
}

/// Parameterised query returning the rows of its first result set.
pub async fn ledger_query(
    client: &mut SqlClient,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Row>> {
    let stream = client
        .query(sql, params)
        .await
        .map_err(|err| AppError::new(ErrorKind::Ledger, err.to_string()))?;
    let rows = stream
        .into_first_result()
        .await
        .map_err(|err| AppError::new(ErrorKind::Ledger, err.to_string()))?;
    Ok(rows)
}

pub fn text_column(row: &Row, idx: usize) -> Result<String> {
    let value: Option<&str> = row
        .try_get(idx)
        .map_err(|err| AppError::new(ErrorKind::Ledger, err.to_string()))?;
    value.map(str::to_string).ok_or_else(|| {
        AppError::new(ErrorKind::Ledger, format!("Unexpected NULL in column {}", idx)).into()
    })
}
