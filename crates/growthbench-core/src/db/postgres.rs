//! tokio-postgres implementation of [`QueryExecutor`].

use super::{quote_ident, Execution, QueryExecutor};
use crate::errors::{ExecError, RunError};
use crate::explain::explain_sql;
use crate::model::{BindValue, RowCountMode};
use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls};

pub const APPLICATION_NAME: &str = "growthbench";

const QUERY_CANCELED: &str = "57014";

pub struct PgExecutor {
    client: Arc<Client>,
    connection: JoinHandle<()>,
}

impl PgExecutor {
    /// Open the single session used for a whole run.
    pub async fn connect(url: &str) -> Result<Self, RunError> {
        let mut config: Config = url
            .parse()
            .map_err(|e: tokio_postgres::Error| RunError::Connect(e.to_string()))?;
        if config.get_application_name().is_none() {
            config.application_name(APPLICATION_NAME);
        }

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| RunError::Connect(e.to_string()))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection terminated");
            }
        });

        tracing::info!(
            hosts = ?config.get_hosts().len(),
            dbname = config.get_dbname().unwrap_or("<default>"),
            "connected to postgres"
        );

        Ok(Self {
            client: Arc::new(client),
            connection,
        })
    }

    /// Shared handle to the session, for stores writing to the same database.
    pub fn client(&self) -> Arc<Client> {
        self.client.clone()
    }

    pub async fn server_version(&self) -> Result<String, ExecError> {
        let row = self.client.query_one("SHOW server_version", &[]).await?;
        Ok(row.try_get::<_, String>(0)?)
    }

    async fn bound_query(
        &self,
        sql: &str,
        params: &[BindValue],
    ) -> Result<Vec<tokio_postgres::Row>, ExecError> {
        // A fresh statement per attempt keeps the server on custom plans.
        let stmt = self.client.prepare(sql).await?;
        let values = bind_all(params, stmt.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .map(|v| v.as_ref() as &(dyn ToSql + Sync))
            .collect();
        Ok(self.client.query(&stmt, &refs).await?)
    }
}

impl Drop for PgExecutor {
    fn drop(&mut self) {
        if Arc::strong_count(&self.client) == 1 {
            self.connection.abort();
        }
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(&self, sql: &str, params: &[BindValue]) -> Result<Execution, ExecError> {
        let rows = self.bound_query(sql, params).await?;
        Ok(Execution {
            returned_rows: rows.len() as u64,
        })
    }

    async fn explain(
        &self,
        sql: &str,
        params: &[BindValue],
    ) -> Result<serde_json::Value, ExecError> {
        let rows = self.bound_query(&explain_sql(sql), params).await?;
        let row = rows
            .first()
            .ok_or_else(|| ExecError::query("EXPLAIN returned no rows"))?;
        Ok(row.try_get::<_, serde_json::Value>(0)?)
    }

    async fn row_count(&self, table: &str, mode: RowCountMode) -> Result<Option<i64>, ExecError> {
        match mode {
            RowCountMode::Off => Ok(None),
            RowCountMode::Exact => {
                let ident = quote_ident(table).map_err(|e| ExecError::query(e.to_string()))?;
                let row = self
                    .client
                    .query_one(&format!("SELECT count(*)::bigint FROM {}", ident), &[])
                    .await?;
                Ok(Some(row.try_get::<_, i64>(0)?))
            }
            RowCountMode::Estimate => {
                // Partitioned parents carry no tuples themselves; add up the leaves.
                // reltuples is -1 until the first ANALYZE (or index build).
                let row = self
                    .client
                    .query_one(
                        "SELECT count(*)::bigint,
                                bool_or(c.reltuples < 0),
                                sum(GREATEST(c.reltuples, 0))::bigint
                         FROM pg_class c
                         WHERE c.relkind <> 'p'
                           AND (c.oid = to_regclass($1::text)
                                OR c.oid IN (SELECT inhrelid FROM pg_inherits
                                             WHERE inhparent = to_regclass($1::text)))",
                        &[&table],
                    )
                    .await?;
                let relations: i64 = row.try_get(0)?;
                let unanalyzed: Option<bool> = row.try_get(1)?;
                if relations == 0 {
                    return Ok(None);
                }
                if unanalyzed == Some(true) {
                    tracing::info!(
                        table = %table,
                        "no planner statistics yet, counting rows exactly"
                    );
                    return self.row_count(table, RowCountMode::Exact).await;
                }
                Ok(row.try_get::<_, Option<i64>>(2)?)
            }
        }
    }

    async fn cancel(&self) -> Result<(), ExecError> {
        self.client
            .cancel_token()
            .cancel_query(NoTls)
            .await
            .map_err(|e| ExecError::query(format!("cancel request failed: {}", e)))
    }

    async fn settle(&self) -> Result<(), ExecError> {
        // Queued behind the cancelled statement, so this returns once it is gone.
        // A cancel that arrived after the statement finished lands here instead.
        for _ in 0..2 {
            match self.client.simple_query("SELECT 1").await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    let e = ExecError::from(e);
                    if e.sqlstate() != Some(QUERY_CANCELED) {
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

type BoxedParam = Box<dyn ToSql + Sync + Send>;

fn bind_all(values: &[BindValue], types: &[Type]) -> Result<Vec<BoxedParam>, ExecError> {
    if values.len() != types.len() {
        return Err(ExecError::query(format!(
            "statement expects {} parameter(s), {} bind value(s) given",
            types.len(),
            values.len()
        )));
    }
    values
        .iter()
        .zip(types)
        .enumerate()
        .map(|(i, (v, ty))| coerce(v, ty, i + 1))
        .collect()
}

/// Convert a catalog value into the Rust type the driver expects for `ty`.
fn coerce(value: &BindValue, ty: &Type, position: usize) -> Result<BoxedParam, ExecError> {
    let out_of_range = || {
        ExecError::query(format!(
            "bind value {} for ${} is out of range for {}",
            value, position, ty
        ))
    };

    let boxed: BoxedParam = match value {
        BindValue::Null => Box::new(SqlNull),
        BindValue::Bool(b) if *ty == Type::BOOL => Box::new(*b),
        BindValue::Int(i) if *ty == Type::INT8 => Box::new(*i),
        BindValue::Int(i) if *ty == Type::INT4 => {
            Box::new(i32::try_from(*i).map_err(|_| out_of_range())?)
        }
        BindValue::Int(i) if *ty == Type::INT2 => {
            Box::new(i16::try_from(*i).map_err(|_| out_of_range())?)
        }
        BindValue::Int(i) if *ty == Type::OID => {
            Box::new(u32::try_from(*i).map_err(|_| out_of_range())?)
        }
        BindValue::Int(i) if *ty == Type::FLOAT8 => Box::new(*i as f64),
        BindValue::Int(i) if *ty == Type::FLOAT4 => Box::new(*i as f32),
        BindValue::Float(f) if *ty == Type::FLOAT8 => Box::new(*f),
        BindValue::Float(f) if *ty == Type::FLOAT4 => Box::new(*f as f32),
        BindValue::Text(s) if is_textual(ty) => Box::new(s.clone()),
        BindValue::Int(i) if is_textual(ty) => Box::new(i.to_string()),
        _ => {
            return Err(ExecError::query(format!(
                "cannot bind {} to ${} of type {}; add an explicit cast such as ${}::text",
                value, position, ty, position
            )))
        }
    };
    Ok(boxed)
}

fn is_textual(ty: &Type) -> bool {
    [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty)
}

/// SQL NULL accepted for any parameter type.
#[derive(Debug)]
struct SqlNull;

impl ToSql for SqlNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut tokio_postgres::types::private::BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
