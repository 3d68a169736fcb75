//! Static description of the pharmacy store.
//!
//! The same description feeds both the grounding text handed to the model
//! and the DDL used to bootstrap an empty database, so the two cannot drift
//! apart inside this crate. A database created elsewhere can still drift;
//! nothing here inspects the live store.

pub mod examples;
pub mod grounding;

use serde::Serialize;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataType {
    Integer,
    Double,
    Varchar,
    Text,
    Date,
}

impl DataType {
    pub fn to_sql_type(&self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Double => "DOUBLE",
            DataType::Varchar => "VARCHAR",
            DataType::Text => "TEXT",
            DataType::Date => "DATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnRole {
    PrimaryKey,
    ForeignKey,
    Plain,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDef {
    pub name: &'static str,
    pub data_type: DataType,
    pub nullable: bool,
    pub role: ColumnRole,
    /// What the column means, phrased for the model.
    pub description: &'static str,
}

impl ColumnDef {
    pub fn to_sql_definition(&self, table: &TableDef) -> String {
        let mut def = format!("{} {}", self.name, self.data_type.to_sql_type());
        match self.role {
            ColumnRole::PrimaryKey => {
                def.push_str(&format!(
                    " PRIMARY KEY DEFAULT nextval('{}')",
                    table.sequence_name()
                ));
            }
            _ if !self.nullable => def.push_str(" NOT NULL"),
            _ => {}
        }
        def
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub from_table: &'static str,
    pub from_column: &'static str,
    pub to_table: &'static str,
    pub to_column: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDef {
    pub name: &'static str,
    pub purpose: &'static str,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn sequence_name(&self) -> String {
        format!("seq_{}", self.name.to_lowercase())
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|col| col.role == ColumnRole::PrimaryKey)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// DuckDB DDL for this table, including the foreign keys that start here.
    pub fn to_create_table_sql(&self, relationships: &[Relationship]) -> String {
        let mut definitions: Vec<String> = self
            .columns
            .iter()
            .map(|col| col.to_sql_definition(self))
            .collect();

        for rel in relationships.iter().filter(|r| r.from_table == self.name) {
            definitions.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                rel.from_column, rel.to_table, rel.to_column
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            definitions.join(",\n    ")
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableDef>,
    pub relationships: Vec<Relationship>,
}

impl SchemaDescription {
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Statements that create every table, referenced tables first.
    pub fn to_ddl(&self) -> Vec<String> {
        let mut statements = Vec::new();
        for table in &self.tables {
            if table.primary_key().is_some() {
                statements.push(format!(
                    "CREATE SEQUENCE IF NOT EXISTS {} START 1;",
                    table.sequence_name()
                ));
            }
            statements.push(table.to_create_table_sql(&self.relationships));
        }
        statements
    }
}

pub const INVENTORY_TABLE: &str = "PHARMACY_INVENTORY";
pub const DIAGNOSTIC_TABLE: &str = "DIAGNOSTIC_DATA";

static PHARMACY_SCHEMA: LazyLock<SchemaDescription> = LazyLock::new(build_pharmacy_schema);

/// The process-wide schema. Built once and only ever read.
pub fn pharmacy_schema() -> &'static SchemaDescription {
    &PHARMACY_SCHEMA
}

fn column(
    name: &'static str,
    data_type: DataType,
    nullable: bool,
    role: ColumnRole,
    description: &'static str,
) -> ColumnDef {
    ColumnDef {
        name,
        data_type,
        nullable,
        role,
        description,
    }
}

fn build_pharmacy_schema() -> SchemaDescription {
    use ColumnRole::*;
    use DataType::*;

    let inventory = TableDef {
        name: INVENTORY_TABLE,
        purpose: "for drug information and stock",
        columns: vec![
            column("DRUG_ID", Integer, false, PrimaryKey, "Unique identifier for the drug (Primary Key). Auto-incremented."),
            column("DRUG_NAME", Varchar, false, Plain, "Brand name of the drug (e.g., 'Lipitor', 'Advil')."),
            column("GENERIC_NAME", Varchar, true, Plain, "Generic name of the drug (e.g., 'Atorvastatin', 'Ibuprofen')."),
            column("FORMULATION", Varchar, true, Plain, "Form of the drug (e.g., 'Tablet', 'Capsule', 'Syrup', 'Injection', 'Inhaler')."),
            column("DOSAGE", Varchar, true, Plain, "Dosage of the drug (e.g., '20mg', '500mg', '90mcg/puff', '5ml')."),
            column("PACK_SIZE", Varchar, true, Plain, "Size of the package (e.g., '30 tabs', '100ml', '1 vial', '50 cap')."),
            column("PRICE_PER_PACK", Double, true, Plain, "Price of one pack of the drug (e.g., 12.50, 35.75)."),
            column("STOCK_QUANTITY", Integer, true, Plain, "Number of packs currently in stock (e.g., 150, 80)."),
            column("EXPIRY_DATE", Date, true, Plain, "Expiry date of the drug in 'YYYY-MM-DD' format."),
            column("SUPPLIER", Varchar, true, Plain, "Name of the drug supplier (e.g., 'PharmaCorp', 'MediSupply')."),
        ],
    };

    let diagnostics = TableDef {
        name: DIAGNOSTIC_TABLE,
        purpose: "for patient diagnoses and prescribed drugs",
        columns: vec![
            column("PATIENT_ID", Integer, false, PrimaryKey, "Unique identifier for the patient (Primary Key). Auto-incremented."),
            column("PATIENT_NAME", Varchar, false, Plain, "Full name of the patient."),
            column("DIAGNOSIS", Varchar, true, Plain, "Medical diagnosis (e.g., 'Hypertension', 'Diabetes', 'Asthma')."),
            column("DIAGNOSIS_DATE", Date, true, Plain, "Date of diagnosis in 'YYYY-MM-DD' format."),
            column("TEST_RESULTS", Text, true, Plain, "Summary of test results."),
            column("DRUG_ID_PRESCRIBED", Integer, true, ForeignKey, "Links to the prescribed drug in PHARMACY_INVENTORY."),
        ],
    };

    SchemaDescription {
        tables: vec![inventory, diagnostics],
        relationships: vec![Relationship {
            from_table: DIAGNOSTIC_TABLE,
            from_column: "DRUG_ID_PRESCRIBED",
            to_table: INVENTORY_TABLE,
            to_column: "DRUG_ID",
        }],
    }
}
