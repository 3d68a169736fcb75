use duckdb::params_from_iter;
use duckdb::types::ToSql;
use tracing::{debug, error};

use crate::db::executor::{
    records_from_batches, ExecutionError, QueryExecutor, RowSet, StatementKind, StoreError,
};

impl QueryExecutor {
    /// Runs a fixed-shape `SELECT` with positional `?` parameters bound by
    /// the driver. Used by canned lookups whose inputs come straight from a
    /// user (search terms, ids); generated SQL never goes through here.
    pub fn read_with_params(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<RowSet, ExecutionError> {
        if StatementKind::classify(sql) != StatementKind::Read {
            return Err(ExecutionError {
                message: "Parameterised execution only supports SELECT statements".to_string(),
                sql: sql.to_string(),
            });
        }

        debug!("Parameterised read with {} params: {}", params.len(), sql);
        self.bound_read(sql, params).map_err(|e| {
            error!("Parameterised read failed: {}", e);
            ExecutionError {
                message: e.to_string(),
                sql: sql.to_string(),
            }
        })
    }

    fn bound_read(&self, sql: &str, params: &[&dyn ToSql]) -> Result<RowSet, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let arrow_batch = stmt.query_arrow(params_from_iter(params.iter()))?;

        let columns: Vec<String> = arrow_batch
            .get_schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect();
        let batches: Vec<_> = arrow_batch.collect();
        let rows = records_from_batches(&columns, &batches)?;
        Ok(RowSet { columns, rows })
    }
}
