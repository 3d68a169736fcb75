use serde::Serialize;

use ExampleCategory::{CrossTable, DiagnosticSingleTable, InventorySingleTable};
use UtteranceKind::{Command, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UtteranceKind {
    Question,
    Command,
}

impl UtteranceKind {
    pub fn label(&self) -> &'static str {
        match self {
            UtteranceKind::Question => "Question",
            UtteranceKind::Command => "Command",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExampleCategory {
    InventorySingleTable,
    DiagnosticSingleTable,
    CrossTable,
}

impl ExampleCategory {
    pub const ALL: [ExampleCategory; 3] = [
        ExampleCategory::InventorySingleTable,
        ExampleCategory::DiagnosticSingleTable,
        ExampleCategory::CrossTable,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            ExampleCategory::InventorySingleTable => "Pharmacy Inventory Examples (Single Table)",
            ExampleCategory::DiagnosticSingleTable => "Diagnostic Data Examples (Single Table)",
            ExampleCategory::CrossTable => {
                "Combined Pharmacy and Diagnostic Data Examples (Using JOINs)"
            }
        }
    }
}

/// A worked utterance/SQL pair shown to the model. Never executed.
#[derive(Debug, Clone, Serialize)]
pub struct FewShotExample {
    pub category: ExampleCategory,
    pub kind: UtteranceKind,
    pub utterance: &'static str,
    pub sql: &'static str,
}

const fn example(
    category: ExampleCategory,
    kind: UtteranceKind,
    utterance: &'static str,
    sql: &'static str,
) -> FewShotExample {
    FewShotExample {
        category,
        kind,
        utterance,
        sql,
    }
}

pub static FEW_SHOT_EXAMPLES: &[FewShotExample] = &[
    example(
        InventorySingleTable,
        Question,
        "How many different tablet formulations do we have?",
        "SELECT COUNT(DISTINCT DRUG_NAME) FROM PHARMACY_INVENTORY WHERE FORMULATION = 'Tablet';",
    ),
    example(
        InventorySingleTable,
        Question,
        "What is the stock quantity for Ibuprofen 200mg tablets?",
        "SELECT STOCK_QUANTITY FROM PHARMACY_INVENTORY WHERE DRUG_NAME = 'Ibuprofen' AND DOSAGE = '200mg' AND FORMULATION = 'Tablet';",
    ),
    example(
        InventorySingleTable,
        Question,
        "Show all drugs with less than 50 packs in stock.",
        "SELECT * FROM PHARMACY_INVENTORY WHERE STOCK_QUANTITY < 50;",
    ),
    example(
        InventorySingleTable,
        Command,
        "I sold 5 packs of Atorvastatin 20mg tablets.",
        "UPDATE PHARMACY_INVENTORY SET STOCK_QUANTITY = STOCK_QUANTITY - 5 WHERE DRUG_NAME = 'Atorvastatin' AND DOSAGE = '20mg' AND FORMULATION = 'Tablet';",
    ),
    example(
        InventorySingleTable,
        Command,
        "Restock 10 packs of Metformin 500mg tablets.",
        "UPDATE PHARMACY_INVENTORY SET STOCK_QUANTITY = STOCK_QUANTITY + 10 WHERE DRUG_NAME = 'Metformin' AND DOSAGE = '500mg' AND FORMULATION = 'Tablet';",
    ),
    example(
        InventorySingleTable,
        Command,
        "Add a new drug: Paracetamol, generic, Tablet, 500mg, 100 tabs, 2.50 price, 500 stock, 2026-10-01 expiry, supplied by GenericMeds.",
        "INSERT INTO PHARMACY_INVENTORY (DRUG_NAME, GENERIC_NAME, FORMULATION, DOSAGE, PACK_SIZE, PRICE_PER_PACK, STOCK_QUANTITY, EXPIRY_DATE, SUPPLIER) VALUES ('Paracetamol', 'Paracetamol', 'Tablet', '500mg', '100 tabs', 2.50, 500, '2026-10-01', 'GenericMeds');",
    ),
    example(
        InventorySingleTable,
        Command,
        "Remove the drug with DRUG_ID 15.",
        "DELETE FROM PHARMACY_INVENTORY WHERE DRUG_ID = 15;",
    ),
    example(
        DiagnosticSingleTable,
        Question,
        "List all patient names with a 'Hypertension' diagnosis.",
        "SELECT PATIENT_NAME FROM DIAGNOSTIC_DATA WHERE DIAGNOSIS = 'Hypertension';",
    ),
    example(
        DiagnosticSingleTable,
        Question,
        "How many diagnoses were made in 2024?",
        "SELECT COUNT(*) FROM DIAGNOSTIC_DATA WHERE DIAGNOSIS_DATE BETWEEN '2024-01-01' AND '2024-12-31';",
    ),
    example(
        DiagnosticSingleTable,
        Question,
        "Show diagnostic data for patient Amit Sharma.",
        "SELECT * FROM DIAGNOSTIC_DATA WHERE PATIENT_NAME = 'Amit Sharma';",
    ),
    example(
        DiagnosticSingleTable,
        Command,
        "Add a new patient record: Patient Name: Suresh Rao, Diagnosis: Anxiety, Diagnosis Date: 2024-02-01, Test Results: Generalized anxiety symptoms, Prescribed Drug ID: NULL.",
        "INSERT INTO DIAGNOSTIC_DATA (PATIENT_NAME, DIAGNOSIS, DIAGNOSIS_DATE, TEST_RESULTS, DRUG_ID_PRESCRIBED) VALUES ('Suresh Rao', 'Anxiety', '2024-02-01', 'Generalized anxiety symptoms', NULL);",
    ),
    example(
        DiagnosticSingleTable,
        Command,
        "Delete the diagnostic record for PATIENT_ID 105.",
        "DELETE FROM DIAGNOSTIC_DATA WHERE PATIENT_ID = 105;",
    ),
    example(
        CrossTable,
        Question,
        "List the names of patients who were prescribed 'Atorvastatin'.",
        "SELECT D.PATIENT_NAME FROM DIAGNOSTIC_DATA AS D INNER JOIN PHARMACY_INVENTORY AS P ON D.DRUG_ID_PRESCRIBED = P.DRUG_ID WHERE P.DRUG_NAME = 'Atorvastatin';",
    ),
    example(
        CrossTable,
        Question,
        "What drugs were prescribed for patients diagnosed with 'Diabetes'?",
        "SELECT DISTINCT P.DRUG_NAME, P.GENERIC_NAME FROM PHARMACY_INVENTORY AS P INNER JOIN DIAGNOSTIC_DATA AS D ON P.DRUG_ID = D.DRUG_ID_PRESCRIBED WHERE D.DIAGNOSIS LIKE '%Diabetes%';",
    ),
    example(
        CrossTable,
        Question,
        "Show the diagnosis and prescribed drug for patient Amit Sharma.",
        "SELECT D.DIAGNOSIS, P.DRUG_NAME FROM DIAGNOSTIC_DATA AS D LEFT JOIN PHARMACY_INVENTORY AS P ON D.DRUG_ID_PRESCRIBED = P.DRUG_ID WHERE D.PATIENT_NAME = 'Amit Sharma';",
    ),
    example(
        CrossTable,
        Question,
        "Find all patients who were prescribed any tablet formulation.",
        "SELECT DISTINCT D.PATIENT_NAME FROM DIAGNOSTIC_DATA AS D INNER JOIN PHARMACY_INVENTORY AS P ON D.DRUG_ID_PRESCRIBED = P.DRUG_ID WHERE P.FORMULATION = 'Tablet';",
    ),
];

pub fn examples_in(category: ExampleCategory) -> impl Iterator<Item = &'static FewShotExample> {
    FEW_SHOT_EXAMPLES
        .iter()
        .filter(move |ex| ex.category == category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::executor::StatementKind;

    #[test]
    fn library_spans_reads_writes_and_joins() {
        let kinds: Vec<StatementKind> = FEW_SHOT_EXAMPLES
            .iter()
            .map(|ex| StatementKind::classify(ex.sql))
            .collect();
        assert!(kinds.contains(&StatementKind::Read));
        assert!(kinds.contains(&StatementKind::Write));
        assert!(!kinds.contains(&StatementKind::Ddl));

        for category in ExampleCategory::ALL {
            assert!(examples_in(category).count() > 0, "{:?} is empty", category);
        }
        assert!(examples_in(CrossTable).all(|ex| ex.sql.contains("JOIN")));
    }

    #[test]
    fn commands_are_writes_and_questions_are_reads() {
        for ex in FEW_SHOT_EXAMPLES {
            let expected = match ex.kind {
                Question => StatementKind::Read,
                Command => StatementKind::Write,
            };
            assert_eq!(StatementKind::classify(ex.sql), expected, "{}", ex.utterance);
        }
    }
}
