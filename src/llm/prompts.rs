//! Prompt templates for LLM interactions

use crate::schema::FormattedDatabase;

/// Instruction for ranking schema namespaces by analytic relevance
pub const SELECTION_SYSTEM_PROMPT: &str = r#"You will receive a list of database schemas with the tables they contain. Your objective is to select the schemas that interest us.
What we want is to identify the schemas that contain data relevant for analytics and that would be queried in SQL in a data visualisation tool by an end user (again for analytics, not debugging).

For instance, we would typically keep schemas called "prod", "public", "mart", "facts", "analytics", "reporting", "dbt_production"...
On the other end, we do not want to include any dev schemas or landing schemas for etl tools.
For instance, we would typically not keep schemas called "staging", "raw", "etl", "fivetran", "census", "salesforce", "hubspot", "sandbox", "temp", "audit", "change_log", "dev", "dbt_staging", "dbt_<user_name>"...
If there are several schemas starting with "dbt_", keep only one (the one that looks like it's for production).

Regarding the name of the tables contained in each schema, tables that look like internal api names of etl tools are usually indication that the schema does not interest us.
For instance: "asset__c", "user_account__items", "_sdc_rejected", "_fivetran_sync"...

Return a json array containing the names of the schemas as strings ordered from the most interesting to the least interesting.
Format of your answer: string[].
Do not include any explanation, just the array.
Do not start your response with backticks.
Only include schema names provided in the input, do not add any other names. Include at least one schema name.
"#;

fn schema_section(database: &FormattedDatabase) -> String {
    format!(
        "Database engine: {}\n\nDatabase schema:\n{}",
        database.engine, database.tables
    )
}

/// System instruction and messages for SQL generation
pub fn query_prompt(
    database: &FormattedDatabase,
    request: &str,
    current_query: Option<&str>,
) -> (String, Vec<String>) {
    let system = format!(
        "You are a SQL expert embedded in a data visualisation tool. \
         Write a single query in the dialect of the database engine below that answers the user's request. \
         Use only tables and columns present in the schema. \
         Respond with ONLY the raw SQL query text, without markdown code fences or explanations.\n\n{}",
        schema_section(database)
    );

    let mut messages = Vec::new();
    if let Some(query) = current_query.filter(|q| !q.trim().is_empty()) {
        messages.push(format!("Current query in the editor:\n{}", query));
    }
    messages.push(request.to_string());

    (system, messages)
}

/// System instruction and messages for explaining a database error
pub fn explain_error_prompt(
    database: &FormattedDatabase,
    query: &str,
    error: &str,
) -> (String, Vec<String>) {
    let system = format!(
        "You are a SQL expert. Explain concisely, in plain language, why the query failed \
         and what should be changed. Reference specific tables and columns from the schema.\n\n{}",
        schema_section(database)
    );
    let message = format!("Query:\n{}\n\nError returned by the database:\n{}", query, error);

    (system, vec![message])
}

/// System instruction and messages for fixing a failing query
pub fn fix_error_prompt(database: &FormattedDatabase, query: &str, error: &str) -> (String, Vec<String>) {
    let system = format!(
        "You are a SQL expert. Rewrite the query so that it no longer raises the error. \
         Keep its intent. Respond with ONLY the corrected raw SQL query text, \
         without markdown code fences or explanations.\n\n{}",
        schema_section(database)
    );
    let message = format!("Query:\n{}\n\nError returned by the database:\n{}", query, error);

    (system, vec![message])
}

/// Remove a surrounding markdown code fence, with its language tag
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim().to_string()
}
