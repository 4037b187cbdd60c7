//! Prompt text for the selected tables

use super::{FormattedDatabase, FormattedSchema, SchemaOptionsRoot, TableOption};

/// Concatenate the descriptions of every selected table, per database
///
/// Tables are ordered by schema namespace; the sort is stable so tables of
/// the same namespace keep their option order. Each description is a
/// complete YAML document, so no separator is needed.
pub fn format_schema(options: &SchemaOptionsRoot) -> FormattedSchema {
    options
        .iter()
        .map(|(id, database)| {
            let mut selected: Vec<&TableOption> =
                database.tables.iter().filter(|t| t.selected).collect();
            selected.sort_by(|a, b| a.schema.cmp(&b.schema));

            let tables = selected
                .iter()
                .map(|t| t.formatted_description.as_str())
                .collect::<String>();

            (
                *id,
                FormattedDatabase {
                    engine: database.engine.clone(),
                    tables,
                },
            )
        })
        .collect()
}
