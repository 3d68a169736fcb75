use std::fmt::Write;

use super::examples::{examples_in, ExampleCategory};
use super::{ColumnRole, SchemaDescription};

const INTRO: &str = "You are an expert AI assistant specializing in converting natural language commands and questions into SQL queries.";

const OUTRO: &str = "Now, generate an SQL query for the given question or command:";

/// Grounding text for the pharmacy schema.
pub fn build_grounding_text() -> String {
    render_grounding(super::pharmacy_schema())
}

/// Renders the schema, join guidance, output rules and the example library.
///
/// Pure and deterministic: the same description always yields the same text.
pub fn render_grounding(schema: &SchemaDescription) -> String {
    let mut text = String::new();
    text.push_str(INTRO);
    text.push_str("\n\n");

    // `write!` into a String cannot fail
    let _ = writeln!(
        text,
        "The SQL database contains {} tables:\n",
        schema.tables.len()
    );

    for (i, table) in schema.tables.iter().enumerate() {
        let _ = writeln!(text, "**{}. `{}` ({})**", i + 1, table.name, table.purpose);
        for col in &table.columns {
            let mut line = format!(
                "- `{}` ({}): {}",
                col.name,
                col.data_type.to_sql_type(),
                col.description
            );
            if col.role == ColumnRole::ForeignKey {
                if let Some(rel) = schema
                    .relationships
                    .iter()
                    .find(|r| r.from_table == table.name && r.from_column == col.name)
                {
                    let _ = write!(
                        line,
                        " Foreign key linking to `{}.{}`.",
                        rel.to_table, rel.to_column
                    );
                }
            }
            if col.nullable && col.role != ColumnRole::PrimaryKey {
                line.push_str(" Can be NULL.");
            }
            text.push_str(&line);
            text.push('\n');
        }
        text.push('\n');
    }

    text.push_str("**Important Guidelines:**\n");
    let mut rules: Vec<String> = vec![
        "**Output should contain ONLY the SQL query.** Do not include explanations, formatting markdown, code fences, or any other text.".to_string(),
        "Use proper SQL syntax.".to_string(),
        "**Use `JOIN` clauses (specifically `INNER JOIN` or `LEFT JOIN`) when information is needed from more than one table.**".to_string(),
    ];
    for rel in &schema.relationships {
        rules.push(format!(
            "`{}.{}` can be joined with `{}.{}`.",
            rel.to_table, rel.to_column, rel.from_table, rel.from_column
        ));
    }
    rules.extend(
        [
            "For **read operations (questions)**, generate `SELECT` queries.",
            "For **update/sell/restock operations (commands)**, generate `UPDATE` queries on `PHARMACY_INVENTORY`.",
            "For **adding new data**, generate `INSERT INTO` queries.",
            "For **deleting data**, generate `DELETE FROM` queries.",
            "Never generate `CREATE`, `DROP` or `ALTER` statements.",
            "For date comparisons, use the format 'YYYY-MM-DD'.",
            "Use `LIKE` for partial string matches (e.g., `WHERE DRUG_NAME LIKE '%cillin%'`).",
            "Handle cases where a column might be NULL (e.g., `WHERE GENERIC_NAME IS NULL` or `WHERE DRUG_ID_PRESCRIBED IS NULL`).",
        ]
        .into_iter()
        .map(str::to_string),
    );
    for (i, rule) in rules.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", i + 1, rule);
    }

    text.push_str(
        "\nHere are some examples of natural language questions and commands and their corresponding SQL queries:\n",
    );
    for category in ExampleCategory::ALL {
        let _ = writeln!(text, "\n**{}:**", category.heading());
        for ex in examples_in(category) {
            let _ = writeln!(text, "- **{}**: \"{}\"", ex.kind.label(), ex.utterance);
            let _ = writeln!(text, "- **SQL Query**: `{}`\n", ex.sql);
        }
    }

    text.push_str(OUTRO);
    text.push('\n');
    text
}
