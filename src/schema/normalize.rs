//! Raw metadata normalization
//!
//! Turns the raw schema of every database into [`TableOption`]s carrying a
//! YAML description of the table and its token count. Everything starts
//! selected.

use super::tokens::count_tokens;
use super::{
    ColumnOption, DatabaseOptions, RawColumn, RawDatabase, RawTable, SchemaOptionsRoot,
    TableOption,
};
use serde_yaml::{Mapping, Value};

/// Normalize every database of a raw schema
///
/// An empty input yields an empty map. When the same database id appears
/// twice, the later entry wins.
pub fn normalize(raw: &[RawDatabase]) -> Result<SchemaOptionsRoot, serde_yaml::Error> {
    let mut root = SchemaOptionsRoot::new();
    for database in raw {
        root.insert(database.id, normalize_database(database)?);
    }
    Ok(root)
}

fn normalize_database(database: &RawDatabase) -> Result<DatabaseOptions, serde_yaml::Error> {
    let tables = database
        .tables
        .iter()
        .map(|table| normalize_table(table, database))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DatabaseOptions {
        engine: database.engine.clone(),
        name: database.name.clone(),
        tables,
    })
}

fn normalize_table(table: &RawTable, database: &RawDatabase) -> Result<TableOption, serde_yaml::Error> {
    let mut option = TableOption {
        id: table.id,
        name: table.name.clone(),
        schema: table.schema.clone(),
        description: table.description.clone(),
        selected: true,
        number_tokens: 0,
        formatted_description: String::new(),
        fields: table
            .fields
            .iter()
            .map(|column| normalize_column(column, database))
            .collect(),
    };
    refresh_description(&mut option)?;
    Ok(option)
}

fn normalize_column(column: &RawColumn, database: &RawDatabase) -> ColumnOption {
    ColumnOption {
        id: column.id,
        name: column.name.clone(),
        description: column.description.clone(),
        database_type: column.database_type.clone(),
        target_table_id: column.target_table_id,
        target_column_id: column.target_column_id,
        target_formatted_name: resolve_foreign_key(column, database),
    }
}

/// Render a foreign key as `schema.table.column`
///
/// References that point outside the database are dropped.
fn resolve_foreign_key(column: &RawColumn, database: &RawDatabase) -> Option<String> {
    let table_id = column.target_table_id?;
    let column_id = column.target_column_id?;

    let table = database.tables.iter().find(|t| t.id == table_id)?;
    let target = table.fields.iter().find(|c| c.id == column_id)?;

    Some(format!("{}.{}.{}", table.schema, table.name, target.name))
}

/// Recompute `formatted_description` and `number_tokens` from the table's
/// current description and fields
pub fn refresh_description(table: &mut TableOption) -> Result<(), serde_yaml::Error> {
    table.formatted_description = describe_table(table)?;
    table.number_tokens = count_tokens(&table.formatted_description);
    Ok(())
}

/// Serialize a table as a single-key YAML document
///
/// Mappings keep insertion order, so identical input always renders to
/// identical text.
fn describe_table(table: &TableOption) -> Result<String, serde_yaml::Error> {
    let mut columns = Mapping::new();
    for field in &table.fields {
        let mut column = Mapping::new();
        if let Some(description) = non_empty(&field.description) {
            column.insert("description".into(), description.into());
        }
        column.insert("database_type".into(), field.database_type.clone().into());
        if let Some(target) = non_empty(&field.target_formatted_name) {
            column.insert("foreign_key_target".into(), target.into());
        }
        columns.insert(field.name.clone().into(), Value::Mapping(column));
    }

    let mut body = Mapping::new();
    if let Some(description) = non_empty(&table.description) {
        body.insert("description".into(), description.into());
    }
    body.insert("columns".into(), Value::Mapping(columns));

    let mut document = Mapping::new();
    document.insert(table.qualified_name().into(), Value::Mapping(body));

    serde_yaml::to_string(&document)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}
