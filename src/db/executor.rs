//! Runs arbitrary SQL against the DuckDB store and shapes the result.
//!
//! The database file is opened once per executor. Every call takes its own
//! connection to that instance and drops it on every exit path.
//! Statements are classified by their leading keyword only; that decides
//! how the result is shaped, it does not make the statement safe.

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use duckdb::Connection;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Read,
    Write,
    Ddl,
    /// Anything without a recognised leading keyword.
    Other,
}

impl StatementKind {
    pub fn classify(sql: &str) -> Self {
        let keyword: String = sql
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" => StatementKind::Read,
            "INSERT" | "UPDATE" | "DELETE" => StatementKind::Write,
            "CREATE" | "DROP" | "ALTER" => StatementKind::Ddl,
            _ => StatementKind::Other,
        }
    }
}

/// What the executor is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Run whatever arrives, as generated.
    #[default]
    Permissive,
    /// Reject everything that is not a `SELECT` before touching the store.
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Integer(v) => write!(f, "{}", v),
            Scalar::Real(v) => write!(f, "{}", v),
            Scalar::Boolean(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_none(),
            Scalar::Integer(v) => serializer.serialize_i64(*v),
            Scalar::Real(v) => serializer.serialize_f64(*v),
            Scalar::Boolean(v) => serializer.serialize_bool(*v),
            Scalar::Text(v) => serializer.serialize_str(v),
        }
    }
}

impl From<&serde_json::Value> for Scalar {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Integer(i),
                None => Scalar::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Scalar::Text(s.clone()),
            other => Scalar::Text(other.to_string()),
        }
    }
}

/// One result row: column name to value, in the query's column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Vec<(String, Scalar)>);

impl Record {
    pub fn new(fields: Vec<(String, Scalar)>) -> Self {
        Self(fields)
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.fields().map(|(_, value)| match value {
                Scalar::Null => String::new(),
                other => other.to_string(),
            }))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionOutput {
    Rows(RowSet),
    Status { message: String },
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("Database error: {message}")]
pub struct ExecutionError {
    pub message: String,
    /// The statement the store rejected, kept for diagnosis.
    pub sql: String,
}

impl ExecutionError {
    fn new(message: impl Into<String>, sql: &str) -> Self {
        Self {
            message: message.into(),
            sql: sql.to_string(),
        }
    }
}

pub type ExecutionResult = Result<ExecutionOutput, ExecutionError>;

#[derive(Clone)]
pub struct QueryExecutor {
    db_path: PathBuf,
    policy: ExecutionPolicy,
    // One DuckDB instance per file; connections are cloned from it
    database: Arc<Mutex<Connection>>,
}

impl fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("db_path", &self.db_path)
            .field("policy", &self.policy)
            .finish()
    }
}

impl QueryExecutor {
    /// Opens (or creates) the database file, creating its directory if needed.
    pub fn new(db_path: impl Into<PathBuf>, policy: ExecutionPolicy) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                info!("Creating database directory: {}", parent.display());
                std::fs::create_dir_all(parent)?;
            }
        }

        let database = Connection::open(&db_path)?;
        info!("Opened database {}", db_path.display());
        Ok(Self {
            db_path,
            policy,
            database: Arc::new(Mutex::new(database)),
        })
    }

    /// Same database, different policy.
    pub fn with_policy(&self, policy: ExecutionPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub(crate) fn connect(&self) -> Result<Connection, duckdb::Error> {
        let database = self
            .database
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        database.try_clone()
    }

    /// Executes one statement. Never panics and never retries.
    pub fn execute(&self, sql: &str) -> ExecutionResult {
        let kind = StatementKind::classify(sql);
        info!("Executing {:?} statement", kind);
        debug!("SQL: {}", sql);

        if self.policy == ExecutionPolicy::ReadOnly && kind != StatementKind::Read {
            warn!("Rejected {:?} statement under read-only policy", kind);
            return Err(ExecutionError::new(
                "Only SELECT statements are allowed by the read-only execution policy",
                sql,
            ));
        }

        let result = match kind {
            StatementKind::Read => self.run_read(sql).map(ExecutionOutput::Rows),
            StatementKind::Write => self.run_write(sql).map(|affected| ExecutionOutput::Status {
                message: format!("Query executed successfully. Rows affected: {}", affected),
            }),
            StatementKind::Ddl => self.run_write(sql).map(|_| ExecutionOutput::Status {
                message: "DDL query executed successfully.".to_string(),
            }),
            StatementKind::Other => {
                warn!("Unrecognised leading keyword, running as a read statement");
                self.run_read(sql).map(ExecutionOutput::Rows)
            }
        };

        result.map_err(|e| {
            error!("Statement failed: {}", e);
            ExecutionError::new(e.to_string(), sql)
        })
    }

    fn run_read(&self, sql: &str) -> Result<RowSet, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let arrow_batch = stmt.query_arrow([])?;

        let schema = arrow_batch.get_schema();
        let columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect();

        let record_batches: Vec<RecordBatch> = arrow_batch.collect();
        let rows = records_from_batches(&columns, &record_batches)?;

        info!("Read returned {} rows across {} columns", rows.len(), columns.len());
        Ok(RowSet { columns, rows })
    }

    /// Runs the statement in its own transaction and commits at once.
    fn run_write(&self, sql: &str) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let affected = tx.execute(sql, [])?;
        tx.commit()?;
        info!("Statement committed, {} rows affected", affected);
        Ok(affected)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("{0}")]
    Arrow(#[from] ArrowError),
}

pub(crate) fn records_from_batches(
    columns: &[String],
    batches: &[RecordBatch],
) -> Result<Vec<Record>, ArrowError> {
    let mut records = Vec::new();
    for batch in batches {
        let converted: Vec<Vec<Scalar>> = batch
            .columns()
            .iter()
            .map(column_scalars)
            .collect::<Result<_, _>>()?;

        for row in 0..batch.num_rows() {
            let fields = columns
                .iter()
                .zip(converted.iter())
                .map(|(name, values)| (name.clone(), values[row].clone()))
                .collect();
            records.push(Record::new(fields));
        }
    }
    Ok(records)
}

fn column_scalars(array: &ArrayRef) -> Result<Vec<Scalar>, ArrowError> {
    let len = array.len();
    match array.data_type() {
        DataType::Null => Ok(vec![Scalar::Null; len]),
        DataType::Boolean => {
            let values = array.as_boolean();
            Ok((0..len)
                .map(|i| {
                    if values.is_null(i) {
                        Scalar::Null
                    } else {
                        Scalar::Boolean(values.value(i))
                    }
                })
                .collect())
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Decimal128(_, 0) => {
            let widened = cast(array, &DataType::Int64)?;
            let values = widened.as_primitive::<Int64Type>();
            Ok((0..len)
                .map(|i| {
                    if values.is_null(i) {
                        Scalar::Null
                    } else {
                        Scalar::Integer(values.value(i))
                    }
                })
                .collect())
        }
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => {
            let widened = cast(array, &DataType::Float64)?;
            let values = widened.as_primitive::<Float64Type>();
            Ok((0..len)
                .map(|i| {
                    if values.is_null(i) {
                        Scalar::Null
                    } else {
                        Scalar::Real(values.value(i))
                    }
                })
                .collect())
        }
        _ => (0..len)
            .map(|i| {
                if array.is_null(i) {
                    Ok(Scalar::Null)
                } else {
                    array_value_to_string(array, i).map(Scalar::Text)
                }
            })
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::bootstrap::bootstrap;
    use tempfile::TempDir;

    /// A bootstrapped store in a temp dir with two drugs in stock.
    pub(crate) fn seeded_store(policy: ExecutionPolicy) -> (TempDir, QueryExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pharmacy.duckdb");
        let executor = QueryExecutor::new(&path, ExecutionPolicy::Permissive).unwrap();
        bootstrap(&executor).unwrap();
        for sql in [
            "INSERT INTO PHARMACY_INVENTORY (DRUG_NAME, GENERIC_NAME, FORMULATION, DOSAGE, PACK_SIZE, PRICE_PER_PACK, STOCK_QUANTITY, EXPIRY_DATE, SUPPLIER) VALUES ('Ventolin', 'Salbutamol', 'Inhaler', '100mcg/puff', '1 inhaler', 25.0, 30, '2025-10-01', 'RespiraLabs');",
            "INSERT INTO PHARMACY_INVENTORY (DRUG_NAME, GENERIC_NAME, FORMULATION, DOSAGE, PACK_SIZE, PRICE_PER_PACK, STOCK_QUANTITY, EXPIRY_DATE, SUPPLIER) VALUES ('Amoxil', 'Amoxicillin', 'Capsule', '250mg', '20 caps', 8.2, 80, '2026-06-15', 'MediSupply');",
        ] {
            executor.execute(sql).unwrap();
        }
        (dir, executor.with_policy(policy))
    }

    fn rows(result: ExecutionResult) -> RowSet {
        match result {
            Ok(ExecutionOutput::Rows(rows)) => rows,
            other => panic!("expected rows, got {:?}", other),
        }
    }

    fn status(result: ExecutionResult) -> String {
        match result {
            Ok(ExecutionOutput::Status { message }) => message,
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn classification_uses_trimmed_leading_keyword() {
        assert_eq!(StatementKind::classify("  select * from t"), StatementKind::Read);
        assert_eq!(StatementKind::classify("\n\tSELECT(1)"), StatementKind::Read);
        assert_eq!(StatementKind::classify("Insert into t values (1)"), StatementKind::Write);
        assert_eq!(StatementKind::classify("update t set a = 1"), StatementKind::Write);
        assert_eq!(StatementKind::classify("DELETE FROM t"), StatementKind::Write);
        assert_eq!(StatementKind::classify("create table t (a int)"), StatementKind::Ddl);
        assert_eq!(StatementKind::classify("DROP TABLE t"), StatementKind::Ddl);
        assert_eq!(StatementKind::classify("alter table t add b int"), StatementKind::Ddl);
        assert_eq!(StatementKind::classify("WITH x AS (SELECT 1) SELECT * FROM x"), StatementKind::Other);
        assert_eq!(StatementKind::classify(""), StatementKind::Other);
        assert_eq!(StatementKind::classify("SELECTED"), StatementKind::Other);
    }

    #[test]
    fn classification_is_stable() {
        for sql in ["SELECT 1", "update t set a=1", "vacuum", "drop table x"] {
            assert_eq!(StatementKind::classify(sql), StatementKind::classify(sql));
        }
    }

    #[test]
    fn low_stock_query_returns_only_matching_row() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let result = rows(executor.execute(
            "SELECT DRUG_NAME, STOCK_QUANTITY FROM PHARMACY_INVENTORY WHERE STOCK_QUANTITY < 50;",
        ));

        assert_eq!(result.columns, vec!["DRUG_NAME", "STOCK_QUANTITY"]);
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0].get("DRUG_NAME"), Some(&Scalar::Text("Ventolin".into())));
        assert_eq!(result.rows[0].get("STOCK_QUANTITY"), Some(&Scalar::Integer(30)));
    }

    #[test]
    fn sell_command_decrements_stock() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        executor
            .execute("INSERT INTO PHARMACY_INVENTORY (DRUG_NAME, GENERIC_NAME, FORMULATION, DOSAGE, STOCK_QUANTITY) VALUES ('Ibuprofen', 'Ibuprofen', 'Tablet', '200mg', 300);")
            .unwrap();

        let message = status(executor.execute(
            "UPDATE PHARMACY_INVENTORY SET STOCK_QUANTITY = STOCK_QUANTITY - 5 WHERE DRUG_NAME = 'Ibuprofen' AND DOSAGE = '200mg' AND FORMULATION = 'Tablet';",
        ));
        assert_eq!(message, "Query executed successfully. Rows affected: 1");

        let after = rows(executor.execute(
            "SELECT STOCK_QUANTITY FROM PHARMACY_INVENTORY WHERE DRUG_NAME = 'Ibuprofen';",
        ));
        assert_eq!(after.rows[0].get("STOCK_QUANTITY"), Some(&Scalar::Integer(295)));
    }

    #[test]
    fn delete_of_missing_row_reports_zero_affected() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let message = status(executor.execute("DELETE FROM PHARMACY_INVENTORY WHERE DRUG_ID = 999999;"));
        assert_eq!(message, "Query executed successfully. Rows affected: 0");
    }

    #[test]
    fn empty_read_keeps_columns_and_is_not_an_error() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let result = executor.execute("SELECT DRUG_ID, DRUG_NAME FROM PHARMACY_INVENTORY WHERE 1 = 0");
        assert!(matches!(&result, Ok(ExecutionOutput::Rows(r)) if r.is_empty()));
        assert_eq!(rows(result).columns, vec!["DRUG_ID", "DRUG_NAME"]);
    }

    #[test]
    fn storage_errors_carry_message_and_sql() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let sql = "SELECT NO_SUCH_COLUMN FROM PHARMACY_INVENTORY";
        let err = executor.execute(sql).unwrap_err();
        assert_eq!(err.sql, sql);
        assert!(!err.message.is_empty());

        // NOT NULL violation on the write path
        let err = executor
            .execute("INSERT INTO PHARMACY_INVENTORY (GENERIC_NAME) VALUES ('x')")
            .unwrap_err();
        assert!(err.to_string().starts_with("Database error:"));
    }

    #[test]
    fn select_never_yields_status_and_writes_never_yield_rows() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        for sql in ["SELECT * FROM PHARMACY_INVENTORY", "select 1", "SELECT * FROM NOPE"] {
            assert!(!matches!(executor.execute(sql), Ok(ExecutionOutput::Status { .. })));
        }
        for sql in [
            "UPDATE PHARMACY_INVENTORY SET SUPPLIER = 'X' WHERE DRUG_ID = 1",
            "DELETE FROM PHARMACY_INVENTORY WHERE DRUG_ID = 42",
            "INSERT INTO NOPE VALUES (1)",
        ] {
            assert!(!matches!(executor.execute(sql), Ok(ExecutionOutput::Rows(_))));
        }
    }

    #[test]
    fn values_are_converted_by_column_type() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let result = rows(executor.execute(
            "SELECT DRUG_NAME, PRICE_PER_PACK, EXPIRY_DATE, CAST(NULL AS VARCHAR) AS NOTHING, COUNT(*) OVER () AS N FROM PHARMACY_INVENTORY ORDER BY DRUG_ID LIMIT 1",
        ));
        let row = &result.rows[0];
        assert_eq!(row.get("PRICE_PER_PACK"), Some(&Scalar::Real(25.0)));
        assert_eq!(row.get("EXPIRY_DATE"), Some(&Scalar::Text("2025-10-01".into())));
        assert_eq!(row.get("NOTHING"), Some(&Scalar::Null));
        assert_eq!(row.get("N"), Some(&Scalar::Integer(2)));
    }

    #[test]
    fn unclassified_statements_return_rows() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let result = rows(executor.execute(
            "WITH low AS (SELECT DRUG_NAME, STOCK_QUANTITY FROM PHARMACY_INVENTORY WHERE STOCK_QUANTITY < 50) SELECT * FROM low",
        ));
        assert_eq!(result.columns, vec!["DRUG_NAME", "STOCK_QUANTITY"]);
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0].get("DRUG_NAME"), Some(&Scalar::Text("Ventolin".into())));
    }

    #[test]
    fn concurrent_writers_lose_no_committed_updates() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let sql = "UPDATE PHARMACY_INVENTORY SET STOCK_QUANTITY = STOCK_QUANTITY + 1 WHERE DRUG_NAME = 'Ventolin'";

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let executor = executor.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| {
                            matches!(
                                executor.execute(sql),
                                Ok(ExecutionOutput::Status { ref message }) if message.ends_with("Rows affected: 1")
                            )
                        })
                        .count()
                })
            })
            .collect();
        let committed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(committed > 0);

        // Conflicting updates may be refused, but every one reported as
        // committed must be visible
        let after = rows(executor.execute(
            "SELECT STOCK_QUANTITY FROM PHARMACY_INVENTORY WHERE DRUG_NAME = 'Ventolin'",
        ));
        assert_eq!(
            after.rows[0].get("STOCK_QUANTITY"),
            Some(&Scalar::Integer(30 + committed as i64))
        );
    }

    #[test]
    fn ddl_is_tolerated() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let message = status(executor.execute("CREATE TABLE SCRATCH (A INTEGER)"));
        assert_eq!(message, "DDL query executed successfully.");
    }

    #[test]
    fn read_only_policy_rejects_writes_before_running_them() {
        let (_dir, executor) = seeded_store(ExecutionPolicy::Permissive);
        let read_only = executor.with_policy(ExecutionPolicy::ReadOnly);

        let err = read_only
            .execute("DELETE FROM PHARMACY_INVENTORY")
            .unwrap_err();
        assert!(err.message.contains("read-only"));

        let remaining = rows(read_only.execute("SELECT * FROM PHARMACY_INVENTORY"));
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn csv_export_keeps_column_order() {
        let set = RowSet {
            columns: vec!["B".into(), "A".into()],
            rows: vec![Record::new(vec![
                ("B".into(), Scalar::Text("x, y".into())),
                ("A".into(), Scalar::Null),
            ])],
        };
        assert_eq!(set.to_csv().unwrap(), "B,A\n\"x, y\",\n");
    }

    #[test]
    fn records_serialize_as_ordered_objects() {
        let record = Record::new(vec![
            ("Z".into(), Scalar::Integer(1)),
            ("A".into(), Scalar::Null),
        ]);
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"Z":1,"A":null}"#);
    }
}
