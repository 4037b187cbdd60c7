//! Reconciliation of freshly normalized options with persisted ones
//!
//! A table is identified by its qualified `schema.table` name. Tables that
//! survive keep their persisted `selected` flag and take every other field
//! from the fresh normalization. Tables that disappeared are dropped, and
//! new tables are selected when most of their namespace already is.

use super::{DatabaseOptions, SchemaOptionsRoot, TableOption, NEW_SCHEMA_SENTINEL};
use std::collections::{HashMap, HashSet};

/// Merge `fresh` into `persisted` and return the result
///
/// Databases missing from `fresh` are removed; databases only in `fresh`
/// are adopted as they are. A table that moves to another namespace counts
/// as dropped plus added, so its persisted `selected` flag is not carried.
pub fn merge_options(mut persisted: SchemaOptionsRoot, fresh: SchemaOptionsRoot) -> SchemaOptionsRoot {
    persisted.retain(|id, _| fresh.contains_key(id));

    for (id, fresh_database) in fresh {
        match persisted.remove(&id) {
            Some(old) => {
                persisted.insert(id, merge_database(old, fresh_database));
            }
            None => {
                persisted.insert(id, fresh_database);
            }
        }
    }

    persisted
}

fn merge_database(old: DatabaseOptions, fresh: DatabaseOptions) -> DatabaseOptions {
    let fresh_by_name: HashMap<String, &TableOption> =
        fresh.tables.iter().map(|t| (t.qualified_name(), t)).collect();
    let old_names: HashSet<String> = old.tables.iter().map(|t| t.qualified_name()).collect();

    let mut tables: Vec<TableOption> = old
        .tables
        .iter()
        .filter_map(|kept| {
            fresh_by_name.get(&kept.qualified_name()).map(|current| TableOption {
                selected: kept.selected,
                ..(*current).clone()
            })
        })
        .collect();

    for added in fresh.tables.iter().filter(|t| !old_names.contains(&t.qualified_name())) {
        let selected = namespace_mostly_selected(&fresh.tables, &added.schema)
            && added.schema != NEW_SCHEMA_SENTINEL;
        tables.push(TableOption {
            selected,
            ..added.clone()
        });
    }

    DatabaseOptions {
        engine: fresh.engine,
        name: fresh.name,
        tables,
    }
}

/// At least half of the namespace's tables are selected (ties select)
fn namespace_mostly_selected(tables: &[TableOption], schema: &str) -> bool {
    let (total, selected) = tables
        .iter()
        .filter(|t| t.schema == schema)
        .fold((0usize, 0usize), |(total, selected), t| {
            (total + 1, selected + usize::from(t.selected))
        });
    selected * 2 >= total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::{database, option};
    use crate::schema::{normalize, fixtures};

    fn root(id: u64, db: DatabaseOptions) -> SchemaOptionsRoot {
        let mut root = SchemaOptionsRoot::new();
        root.insert(id, db);
        root
    }

    fn names(db: &DatabaseOptions) -> Vec<String> {
        db.tables.iter().map(|t| t.qualified_name()).collect()
    }

    #[test]
    fn test_merge_with_itself_is_identity() {
        let mut normalized = normalize(&[fixtures::shop_database()]).unwrap();
        normalized.get_mut(&7).unwrap().tables[2].selected = false;

        let merged = merge_options(normalized.clone(), normalized.clone());
        assert_eq!(merged, normalized);
    }

    #[test]
    fn test_removed_tables_are_not_resurrected() {
        let old = root(1, database(vec![option("public", "a", 1, true), option("public", "gone", 1, true)]));
        let fresh = root(1, database(vec![option("public", "a", 1, true)]));

        let merged = merge_options(old, fresh);
        assert_eq!(names(&merged[&1]), vec!["public.a"]);
    }

    #[test]
    fn test_manual_deselection_survives_field_changes() {
        let old = root(1, database(vec![option("public", "a", 1, false)]));
        let mut changed = option("public", "a", 40, true);
        changed.description = Some("now documented".to_string());
        changed.formatted_description = "public.a:\n  description: now documented\n".to_string();
        let fresh = root(1, database(vec![changed]));

        let merged = merge_options(old, fresh);
        let table = &merged[&1].tables[0];

        assert!(!table.selected);
        assert_eq!(table.number_tokens, 40);
        assert_eq!(table.description.as_deref(), Some("now documented"));
        assert!(table.formatted_description.contains("now documented"));
    }

    #[test]
    fn test_database_only_in_old_is_dropped() {
        let mut old = root(1, database(vec![option("public", "a", 1, true)]));
        old.insert(2, database(vec![option("public", "b", 1, false)]));
        let fresh = root(1, database(vec![option("public", "a", 1, true)]));

        let merged = merge_options(old, fresh);
        assert!(merged.contains_key(&1));
        assert!(!merged.contains_key(&2));
    }

    #[test]
    fn test_database_only_in_new_is_adopted() {
        let old = SchemaOptionsRoot::new();
        let fresh = root(5, database(vec![option("mart", "a", 1, true), option("mart", "b", 1, false)]));

        let merged = merge_options(old, fresh.clone());
        assert_eq!(merged, fresh);
    }

    #[test]
    fn test_new_table_selected_when_half_of_namespace_selected() {
        let old = root(1, database(vec![option("public", "a", 1, true)]));
        let fresh = root(
            1,
            database(vec![
                option("public", "a", 1, true),
                option("public", "b", 1, false),
                option("public", "c", 1, true),
                option("public", "d", 1, false),
            ]),
        );

        let merged = merge_options(old, fresh);
        let db = &merged[&1];

        assert_eq!(names(db), vec!["public.a", "public.b", "public.c", "public.d"]);
        // 2 of 4 selected: the tie resolves to selected
        assert!(db.tables[1].selected);
        assert!(db.tables[3].selected);
    }

    #[test]
    fn test_new_table_deselected_when_namespace_mostly_deselected() {
        let old = root(1, database(vec![option("public", "a", 1, true)]));
        let fresh = root(
            1,
            database(vec![
                option("public", "a", 1, true),
                option("public", "b", 1, false),
                option("public", "c", 1, false),
            ]),
        );

        let merged = merge_options(old, fresh);
        assert!(!merged[&1].tables[1].selected);
        assert!(!merged[&1].tables[2].selected);
    }

    #[test]
    fn test_new_schema_sentinel_never_selected() {
        let old = root(1, database(vec![option("public", "a", 1, true)]));
        let fresh = root(
            1,
            database(vec![option("public", "a", 1, true), option("newSchema", "fresh", 1, true)]),
        );

        let merged = merge_options(old, fresh);
        let added = &merged[&1].tables[1];

        assert_eq!(added.qualified_name(), "newSchema.fresh");
        assert!(!added.selected);
    }

    #[test]
    fn test_carried_tables_keep_persisted_order() {
        let old = root(1, database(vec![option("mart", "z", 1, true), option("mart", "y", 1, false)]));
        let fresh = root(
            1,
            database(vec![option("mart", "x", 1, true), option("mart", "y", 1, true), option("mart", "z", 1, true)]),
        );

        let merged = merge_options(old, fresh);
        assert_eq!(names(&merged[&1]), vec!["mart.z", "mart.y", "mart.x"]);
        assert!(!merged[&1].tables[1].selected);
    }

    #[test]
    fn test_namespace_move_is_drop_plus_add() {
        let old = root(1, database(vec![option("staging", "events", 1, false), option("mart", "kpis", 1, true)]));
        let fresh = root(
            1,
            database(vec![option("mart", "kpis", 1, true), option("mart", "events", 1, true)]),
        );

        let merged = merge_options(old, fresh);
        let db = &merged[&1];

        assert_eq!(names(db), vec!["mart.kpis", "mart.events"]);
        // The old deselection belonged to staging.events; mart is fully selected
        assert!(db.tables[1].selected);
    }

    #[test]
    fn test_same_name_in_two_namespaces_are_distinct() {
        let old = root(1, database(vec![option("public", "users", 1, true), option("staging", "users", 1, false)]));
        let fresh = root(
            1,
            database(vec![option("public", "users", 3, true), option("staging", "users", 9, true)]),
        );

        let merged = merge_options(old, fresh);
        let db = &merged[&1];

        assert!(db.tables[0].selected);
        assert_eq!(db.tables[0].number_tokens, 3);
        assert!(!db.tables[1].selected);
        assert_eq!(db.tables[1].number_tokens, 9);
    }
}
