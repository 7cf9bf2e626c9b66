use std::io::BufReader;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use config::shared::PgConnectionConfig;
use rustls::ClientConfig;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::{Client, Connection, NoTls, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::commands::{CommandKind, CommandSet};
use crate::connector::base::Connector;
use crate::connector::fallback::{self, SingleWriter};
use crate::connector::numeric::PgNumeric;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::{
    ColumnType, EventOp, Field, Row, RowChangeEvent, Table, TableKind, Value, WriteOutcome,
};
use crate::{bail, sync_error};

const TABLE_KIND_QUERY: &str = "SELECT table_type FROM information_schema.tables \
     WHERE table_schema = $1 AND table_name = $2";

const COLUMNS_QUERY: &str = "SELECT column_name, data_type FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position";

const PRIMARY_KEY_QUERY: &str = "SELECT kcu.column_name FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
     ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema \
     WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1 AND tc.table_name = $2 \
     ORDER BY kcu.ordinal_position";

/// Spawns a background task that drives a PostgreSQL connection until it terminates.
///
/// The task logs when the connection terminates, either successfully or with an error.
fn spawn_connection_driver<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        if let Err(e) = connection.await {
            error!("an error occurred on the postgres connection: {}", e);
            return;
        }

        info!("postgres connection terminated successfully")
    }
    .instrument(span);

    tokio::spawn(task);
}

/// Connector for PostgreSQL sources and targets.
///
/// Statements arrive rendered in the `postgres` dialect and bind the engine's neutral
/// values through [`PgValue`], which widens or parses them into the column's wire type.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    client: Arc<Client>,
}

impl PostgresConnector {
    /// Establishes a connection to PostgreSQL. The connection uses TLS when the
    /// supplied [`PgConnectionConfig`] asks for it.
    pub async fn connect(config: &PgConnectionConfig) -> SyncResult<Self> {
        match config.tls.enabled {
            true => Self::connect_tls(config).await,
            false => Self::connect_no_tls(config).await,
        }
    }

    async fn connect_no_tls(config: &PgConnectionConfig) -> SyncResult<Self> {
        let (client, connection) = config.with_db().connect(NoTls).await?;
        spawn_connection_driver::<NoTls>(connection);

        info!("successfully connected to postgres without tls");

        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn connect_tls(config: &PgConnectionConfig) -> SyncResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        let mut root_certs_reader = BufReader::new(config.tls.trusted_root_certs.as_bytes());
        for cert in rustls_pemfile::certs(&mut root_certs_reader) {
            let cert = cert?;
            root_store.add(cert)?;
        }

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let (client, connection) = config
            .with_db()
            .connect(MakeRustlsConnect::new(tls_config))
            .await?;
        spawn_connection_driver::<MakeRustlsConnect>(connection);

        info!("successfully connected to postgres with tls");

        Ok(Self {
            client: Arc::new(client),
        })
    }
}

impl Connector for PostgresConnector {
    async fn is_alive(&self) -> bool {
        self.client.simple_query("SELECT 1").await.is_ok()
    }

    async fn introspect(&self, table_name: &str) -> SyncResult<Table> {
        let (schema, name) = split_qualified(table_name);

        let kind_row = self
            .client
            .query_opt(TABLE_KIND_QUERY, &[&schema, &name])
            .await?;
        let Some(kind_row) = kind_row else {
            bail!(
                ErrorKind::MissingTable,
                "Table does not exist in postgres",
                table_name.to_string()
            );
        };
        let table_type: String = kind_row.try_get(0)?;
        let kind = if table_type == "VIEW" {
            TableKind::View
        } else {
            TableKind::Table
        };

        let key_rows = self
            .client
            .query(PRIMARY_KEY_QUERY, &[&schema, &name])
            .await?;
        if key_rows.len() > 1 {
            bail!(
                ErrorKind::SourceSchemaError,
                "Composite primary keys are not supported",
                table_name.to_string()
            );
        }
        let key_column: Option<String> = match key_rows.first() {
            Some(row) => Some(row.try_get(0)?),
            None => None,
        };

        let mut fields = Vec::new();
        for row in self.client.query(COLUMNS_QUERY, &[&schema, &name]).await? {
            let column_name: String = row.try_get(0)?;
            let data_type: String = row.try_get(1)?;
            let pk = key_column.as_deref() == Some(column_name.as_str());

            let mut field = Field::new(column_name, column_type_from(&data_type));
            field.pk = pk;
            fields.push(field);
        }

        let table = Table::new(table_name, kind, fields);
        table.validate()?;

        debug!("introspected {table_name} with {} columns", table.fields.len());

        Ok(table)
    }

    async fn read(&self, _table_name: &str, query: &str, page_args: [u64; 2]) -> SyncResult<Vec<Row>> {
        let binds = page_args.map(|arg| arg as i64);
        let rows = self
            .client
            .query(query, &[&binds[0], &binds[1]])
            .await?;

        rows.iter().map(decode_row).collect()
    }

    async fn count(&self, _table_name: &str, query: &str) -> SyncResult<u64> {
        let row = self.client.query_one(query, &[]).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count as u64)
    }

    async fn write_batch(
        &self,
        _table_name: &str,
        insert: &str,
        fields: &[Field],
        rows: Vec<Row>,
    ) -> SyncResult<WriteOutcome> {
        if rows.is_empty() {
            return Ok(WriteOutcome::new());
        }

        // A statement that does not prepare is a caller bug or a schema drift, not a
        // row problem, so it raises instead of failing the rows.
        let statement = self.client.prepare(insert).await?;

        for (index, row) in rows.iter().enumerate() {
            let binds = bind_row(EventOp::Insert, fields, row)?;
            let params: Vec<&(dyn ToSql + Sync)> =
                binds.iter().map(|bind| bind as &(dyn ToSql + Sync)).collect();

            if let Err(err) = self.client.execute(&statement, &params).await {
                warn!(
                    "batch insert failed on row {} of {}: {err}",
                    index + 1,
                    rows.len()
                );
                return Ok(WriteOutcome::all_failed(rows, SyncError::from(err)));
            }
        }

        Ok(WriteOutcome::succeeded(rows.len() as u64))
    }

    async fn write_one(
        &self,
        _table_name: &str,
        commands: &CommandSet,
        fields: &[Field],
        event: &RowChangeEvent,
    ) -> SyncResult<WriteOutcome> {
        let mut writer = PgSingleWriter {
            client: &self.client,
            commands,
            fields,
        };
        fallback::apply_with_fallback(&mut writer, event).await
    }
}

/// Statement-level adapter the fallback driver runs against one connection.
struct PgSingleWriter<'a> {
    client: &'a Client,
    commands: &'a CommandSet,
    fields: &'a [Field],
}

impl SingleWriter for PgSingleWriter<'_> {
    async fn execute(&mut self, op: EventOp, row: &Row) -> SyncResult<u64> {
        let kind = match op {
            EventOp::Insert => CommandKind::Insert,
            EventOp::Update => CommandKind::Update,
            EventOp::Delete => CommandKind::Delete,
        };
        let sql = self.commands.get(kind);

        let binds = bind_row(op, self.fields, row)?;
        let params: Vec<&(dyn ToSql + Sync)> =
            binds.iter().map(|bind| bind as &(dyn ToSql + Sync)).collect();

        Ok(self.client.execute(sql, &params).await?)
    }

    async fn exists(&mut self, row: &Row) -> SyncResult<bool> {
        let sql = self.commands.get(CommandKind::QueryCountExist);
        let key = PgValue(key_value(self.fields, row)?);

        let result = self.client.query_one(sql, &[&key]).await?;
        let count: i64 = result.try_get(0)?;
        Ok(count > 0)
    }
}

static NULL_VALUE: Value = Value::Null;

/// Binds one row for a single-row statement.
///
/// Inserts bind every field in declaration order. Updates bind the non-key fields
/// first and the key last, matching the generated `SET ... WHERE` shape. Deletes bind
/// only the key. Absent columns bind NULL.
fn bind_row<'a>(op: EventOp, fields: &'a [Field], row: &'a Row) -> SyncResult<Vec<PgValue<'a>>> {
    let value_of =
        |field: &Field| row.get(field.name.as_str()).unwrap_or(&NULL_VALUE);

    let binds = match op {
        EventOp::Insert => fields.iter().map(|field| PgValue(value_of(field))).collect(),
        EventOp::Update => {
            let mut binds: Vec<_> = fields
                .iter()
                .filter(|field| !field.pk)
                .map(|field| PgValue(value_of(field)))
                .collect();
            binds.push(PgValue(key_value(fields, row)?));
            binds
        }
        EventOp::Delete => vec![PgValue(key_value(fields, row)?)],
    };

    Ok(binds)
}

fn key_value<'a>(fields: &[Field], row: &'a Row) -> SyncResult<&'a Value> {
    let key_field = fields.iter().find(|field| field.pk).ok_or_else(|| {
        sync_error!(
            ErrorKind::DialectError,
            "Write statements need a primary key field"
        )
    })?;
    Ok(row.get(key_field.name.as_str()).unwrap_or(&NULL_VALUE))
}

fn split_qualified(table_name: &str) -> (&str, &str) {
    match table_name.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => ("public", table_name),
    }
}

/// Maps an `information_schema` data type onto the neutral column type codes.
fn column_type_from(data_type: &str) -> ColumnType {
    match data_type {
        "boolean" => ColumnType::Bool,
        "smallint" | "integer" => ColumnType::Int,
        "bigint" => ColumnType::BigInt,
        "real" | "double precision" | "numeric" | "decimal" => ColumnType::Double,
        "bytea" => ColumnType::Bytes,
        "date" => ColumnType::Date,
        "timestamp without time zone" | "timestamp with time zone" => ColumnType::Timestamp,
        "uuid" => ColumnType::Uuid,
        "json" | "jsonb" => ColumnType::Json,
        _ => ColumnType::String,
    }
}

fn decode_row(pg_row: &tokio_postgres::Row) -> SyncResult<Row> {
    let mut row = Row::with_capacity(pg_row.len());
    for (index, column) in pg_row.columns().iter().enumerate() {
        let value = decode_value(pg_row, index, column.type_())?;
        row.insert(column.name().to_string(), value);
    }
    Ok(row)
}

/// Decodes one column into the neutral representation. NUMERIC collapses to [`f64`];
/// timestamps with a zone normalize to UTC and drop it.
fn decode_value(row: &tokio_postgres::Row, index: usize, ty: &Type) -> SyncResult<Value> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)?
            .map(|v| Value::I32(v as i32)),
        Type::INT4 => row.try_get::<_, Option<i32>>(index)?.map(Value::I32),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.map(Value::I64),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)?
            .map(|v| Value::F64(v as f64)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(Value::F64),
        Type::NUMERIC => row
            .try_get::<_, Option<PgNumeric>>(index)?
            .map(|v| Value::F64(v.to_f64())),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index)?.map(Value::Bytes),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(index)?.map(Value::Date),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        Type::UUID => row.try_get::<_, Option<Uuid>>(index)?.map(Value::Uuid),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(index)?
            .map(Value::Json),
        _ => row.try_get::<_, Option<String>>(index)?.map(Value::String),
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Adapter binding a neutral [`Value`] as a statement parameter.
///
/// The wire type comes from the prepared statement, so the adapter widens integers,
/// re-encodes numbers for NUMERIC columns, and parses text into typed columns where
/// the textual form is unambiguous. A combination it cannot express falls through to
/// the native encoding and surfaces as a statement error.
#[derive(Debug)]
struct PgValue<'a>(&'a Value);

impl ToSql for PgValue<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::I32(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT8 => i64::from(*v).to_sql(ty, out),
                Type::FLOAT4 | Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::NUMERIC => PgNumeric::from(i64::from(*v)).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::I64(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::NUMERIC => PgNumeric::from(*v).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::F64(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::NUMERIC => PgNumeric::from(*v).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::String(v) => match *ty {
                Type::NUMERIC => PgNumeric::from_str(v)?.to_sql(ty, out),
                Type::DATE => NaiveDate::parse_from_str(v, "%Y-%m-%d")?.to_sql(ty, out),
                Type::TIMESTAMP => {
                    NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S%.f")?.to_sql(ty, out)
                }
                Type::UUID => Uuid::parse_str(v)?.to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out)
                }
                _ => v.to_sql(ty, out),
            },
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => match *ty {
                Type::TIMESTAMPTZ => v.and_utc().to_sql(ty, out),
                Type::DATE => v.date().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Uuid(v) => match *ty {
                Type::TEXT | Type::VARCHAR => v.to_string().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Json(v) => match *ty {
                Type::TEXT | Type::VARCHAR => v.to_string().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}
