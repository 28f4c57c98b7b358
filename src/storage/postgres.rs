use crate::error::{AppError, AppResult};
use crate::storage::{Row, SqlParam, Storage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use serde_json::Value;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;
use uuid::Uuid;

static NULL_PARAM: Option<String> = None;

/// Postgres-backed storage on the deadpool connection pool.
#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    pub fn connect(database_url: &str) -> AppResult<Self> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(database_url.to_string());
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::StartServer(format!("create pool: {e}")))?;
        Ok(Self { pool })
    }

    fn bind(param: &SqlParam) -> &(dyn ToSql + Sync) {
        match param {
            SqlParam::Uuid(v) => v,
            SqlParam::UuidArray(v) => v,
            SqlParam::Text(v) => v,
            SqlParam::Int(v) => v,
            SqlParam::Bool(v) => v,
            SqlParam::Timestamp(v) => v,
            SqlParam::Json(v) => v,
            SqlParam::Null => &NULL_PARAM,
        }
    }

    fn convert_row(row: &tokio_postgres::Row) -> Row {
        let mut out = Row::default();
        for (idx, col) in row.columns().iter().enumerate() {
            let ty = col.type_();
            let value = if *ty == Type::UUID {
                row.try_get::<_, Option<Uuid>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| Value::String(v.to_string()))
            } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                row.try_get::<_, Option<String>>(idx)
                    .ok()
                    .flatten()
                    .map(Value::String)
            } else if *ty == Type::INT8 {
                row.try_get::<_, Option<i64>>(idx)
                    .ok()
                    .flatten()
                    .map(Value::from)
            } else if *ty == Type::INT4 {
                row.try_get::<_, Option<i32>>(idx)
                    .ok()
                    .flatten()
                    .map(Value::from)
            } else if *ty == Type::BOOL {
                row.try_get::<_, Option<bool>>(idx)
                    .ok()
                    .flatten()
                    .map(Value::Bool)
            } else if *ty == Type::TIMESTAMPTZ {
                row.try_get::<_, Option<DateTime<Utc>>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| Value::String(v.to_rfc3339()))
            } else if *ty == Type::JSONB || *ty == Type::JSON {
                row.try_get::<_, Option<Value>>(idx).ok().flatten()
            } else {
                tracing::warn!(column = col.name(), pg_type = %ty, "unmapped column type");
                None
            };
            out.insert(col.name(), value.unwrap_or(Value::Null));
        }
        out
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn execute(&self, query: &str, params: &[SqlParam]) -> AppResult<Vec<Row>> {
        let client = self.pool.get().await?;
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(Self::bind).collect();
        let rows = client.query(query, &bound).await?;
        Ok(rows.iter().map(Self::convert_row).collect())
    }
}
