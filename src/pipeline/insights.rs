//! Fixed-shape lookups behind the summary, insight and search flows.
//! User input is always bound as a parameter, never spliced into SQL.

use chrono::{Months, NaiveDate};

use crate::db::executor::{ExecutionError, QueryExecutor, RowSet, Scalar};

pub const LOW_STOCK_THRESHOLD: i64 = 50;
pub const EXPIRY_HORIZON_MONTHS: u32 = 6;

const PATIENT_HISTORY_SQL: &str = "\
SELECT
    DD.PATIENT_NAME,
    DD.DIAGNOSIS,
    DD.DIAGNOSIS_DATE,
    DD.TEST_RESULTS,
    PI.DRUG_NAME,
    PI.DOSAGE
FROM DIAGNOSTIC_DATA AS DD
LEFT JOIN PHARMACY_INVENTORY AS PI ON DD.DRUG_ID_PRESCRIBED = PI.DRUG_ID
WHERE DD.PATIENT_ID = ?
ORDER BY DD.DIAGNOSIS_DATE ASC";

const INVENTORY_ATTENTION_SQL: &str = "\
SELECT DRUG_NAME, STOCK_QUANTITY, EXPIRY_DATE, SUPPLIER
FROM PHARMACY_INVENTORY
WHERE STOCK_QUANTITY < ? OR EXPIRY_DATE <= CAST(? AS DATE)
ORDER BY EXPIRY_DATE ASC, STOCK_QUANTITY ASC";

const DRUG_SEARCH_SQL: &str = "\
SELECT NAME FROM (
    SELECT DISTINCT DRUG_NAME AS NAME FROM PHARMACY_INVENTORY
    WHERE DRUG_NAME LIKE ?
    UNION
    SELECT DISTINCT GENERIC_NAME AS NAME FROM PHARMACY_INVENTORY
    WHERE GENERIC_NAME LIKE ? AND GENERIC_NAME IS NOT NULL
)
ORDER BY NAME
LIMIT 10";

const DRUG_DETAILS_SQL: &str = "\
SELECT * FROM PHARMACY_INVENTORY
WHERE DRUG_NAME = ? OR GENERIC_NAME = ?
ORDER BY DRUG_ID";

/// Diagnoses for one patient, oldest first, with the prescribed drug if any.
pub fn patient_history(executor: &QueryExecutor, patient_id: i64) -> Result<RowSet, ExecutionError> {
    executor.read_with_params(PATIENT_HISTORY_SQL, &[&patient_id])
}

/// Last day that still counts as "expiring soon" relative to `today`.
pub fn expiry_cutoff(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_months(Months::new(EXPIRY_HORIZON_MONTHS))
        .unwrap_or(NaiveDate::MAX)
}

/// Drugs that are low on stock or expire within the horizon.
pub fn inventory_attention(executor: &QueryExecutor, today: NaiveDate) -> Result<RowSet, ExecutionError> {
    let cutoff = expiry_cutoff(today).format("%Y-%m-%d").to_string();
    executor.read_with_params(INVENTORY_ATTENTION_SQL, &[&LOW_STOCK_THRESHOLD, &cutoff])
}

/// Up to ten distinct brand or generic names containing `term`.
pub fn search_drugs(executor: &QueryExecutor, term: &str) -> Result<Vec<String>, ExecutionError> {
    let pattern = format!("%{}%", term);
    let rows = executor.read_with_params(DRUG_SEARCH_SQL, &[&pattern, &pattern])?;
    Ok(rows
        .rows
        .iter()
        .filter_map(|record| match record.get("NAME") {
            Some(Scalar::Text(name)) => Some(name.clone()),
            _ => None,
        })
        .collect())
}

/// Every inventory row whose brand or generic name is exactly `name`.
pub fn drug_details(executor: &QueryExecutor, name: &str) -> Result<RowSet, ExecutionError> {
    executor.read_with_params(DRUG_DETAILS_SQL, &[&name, &name])
}
