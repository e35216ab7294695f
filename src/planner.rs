//! Query planner for reads.
//!
//! Three canonical shapes, all reading from the history table — never a
//! separate "current" table. Ordering tuple is
//! always `(snapshot_ts DESC, ingested_at DESC, op_id DESC)`. Building the
//! SQL is pure and therefore string-testable without a database; the
//! planner does not cache statements — the store handles that.

use crate::schema::DimensionSchema;
use crate::store::{history_table, INTERNAL_COLUMNS};

const ORDER_TUPLE: &str = "snapshot_ts DESC, ingested_at DESC, op_id DESC";

/// Column list shared by the writer's INSERT and the planner's SELECT,
/// so the two can never drift apart. Order: internal columns, then PK
/// columns, then payload columns.
pub fn column_names(schema: &dyn DimensionSchema) -> Vec<String> {
    let mut cols: Vec<String> = INTERNAL_COLUMNS.iter().map(|s| s.to_string()).collect();
    cols.extend(schema.pk_columns().iter().map(|c| c.name.clone()));
    cols.extend(schema.payload_columns().iter().map(|c| c.name.clone()));
    cols
}

pub fn column_list_sql(schema: &dyn DimensionSchema) -> String {
    column_names(schema).join(", ")
}

fn id_placeholders(id_count: usize) -> String {
    std::iter::repeat("?").take(id_count).collect::<Vec<_>>().join(", ")
}

/// `current-single`: latest row for one `entity_id`, or no rows if the
/// latest row is a tombstone. Argument order: `[entity_id]`.
///
/// Uses a `LIMIT 1` inner select on the ordering tuple followed by an
/// outer `is_deleted = 0` filter, so a deleted tip resolves to "no rows"
/// rather than silently returning the previous live version.
pub fn current_single_sql(dimension: &str, columns: &str) -> String {
    format!(
        "SELECT * FROM (\n  \
            SELECT {columns} FROM {table}\n  \
            WHERE entity_id = ?\n  \
            ORDER BY {order}\n  \
            LIMIT 1\n\
         ) t WHERE is_deleted = 0",
        columns = columns,
        table = history_table(dimension),
        order = ORDER_TUPLE,
    )
}

/// `current-batch`: one latest non-tombstone row per entity. `id_count`
/// is the number of `?` placeholders for an explicit id list; `0` means
/// no id filter at all (every entity).  Argument order:
/// `[entity_id, entity_id, ...]` (possibly empty).
pub fn current_batch_sql(dimension: &str, columns: &str, id_count: usize) -> String {
    let filter = if id_count > 0 {
        format!("WHERE entity_id IN ({})\n  ", id_placeholders(id_count))
    } else {
        String::new()
    };
    format!(
        "WITH ranked AS (\n  \
            SELECT {columns},\n         \
                ROW_NUMBER() OVER (PARTITION BY entity_id ORDER BY {order}) AS rn\n  \
            FROM {table}\n  \
            {filter}\
         )\n\
         SELECT {columns} FROM ranked WHERE rn = 1 AND is_deleted = 0",
        columns = columns,
        order = ORDER_TUPLE,
        table = history_table(dimension),
        filter = filter,
    )
}

/// `as-of-single`: latest row for `entity_id` with `snapshot_ts <= T`, or
/// no rows if that row is a tombstone. Argument order: `[entity_id, T]`.
pub fn as_of_single_sql(dimension: &str, columns: &str) -> String {
    format!(
        "SELECT * FROM (\n  \
            SELECT {columns} FROM {table}\n  \
            WHERE entity_id = ? AND snapshot_ts <= ?\n  \
            ORDER BY {order}\n  \
            LIMIT 1\n\
         ) t WHERE is_deleted = 0",
        columns = columns,
        table = history_table(dimension),
        order = ORDER_TUPLE,
    )
}

/// `as-of-batch`: per-entity latest row with `snapshot_ts <= T` that is
/// not a tombstone. Argument order: `[T, entity_id, entity_id, ...]`
/// (id list possibly empty, in which case every entity is considered).
pub fn as_of_batch_sql(dimension: &str, columns: &str, id_count: usize) -> String {
    let id_filter = if id_count > 0 {
        format!(" AND entity_id IN ({})", id_placeholders(id_count))
    } else {
        String::new()
    };
    format!(
        "WITH ranked AS (\n  \
            SELECT {columns},\n         \
                ROW_NUMBER() OVER (PARTITION BY entity_id ORDER BY {order}) AS rn\n  \
            FROM {table}\n  \
            WHERE snapshot_ts <= ?{id_filter}\n\
         )\n\
         SELECT {columns} FROM ranked WHERE rn = 1 AND is_deleted = 0",
        columns = columns,
        order = ORDER_TUPLE,
        table = history_table(dimension),
        id_filter = id_filter,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SimpleDimensionSchema;

    fn schema() -> SimpleDimensionSchema {
        SimpleDimensionSchema::new("device", &["pk:text"], &["code:text", "name:text"]).unwrap()
    }

    #[test]
    fn column_names_put_internal_first_then_pk_then_payload() {
        let names = column_names(&schema());
        assert_eq!(
            names,
            vec![
                "entity_id", "snapshot_ts", "ingested_at", "op_id", "is_deleted", "attrs_hash",
                "pk", "code", "name",
            ]
        );
    }

    #[test]
    fn current_single_filters_tombstone_in_outer_query() {
        let sql = current_single_sql("device", "entity_id");
        assert!(sql.contains("LIMIT 1"));
        assert!(sql.trim_end().ends_with("WHERE is_deleted = 0"));
        assert_eq!(sql.matches('?').count(), 1);
    }

    #[test]
    fn current_batch_with_no_ids_has_no_where_clause_on_ranked() {
        let sql = current_batch_sql("device", "entity_id", 0);
        assert!(!sql.contains("entity_id IN"));
        assert_eq!(sql.matches('?').count(), 0);
    }

    #[test]
    fn current_batch_with_ids_builds_in_list() {
        let sql = current_batch_sql("device", "entity_id", 3);
        assert!(sql.contains("entity_id IN (?, ?, ?)"));
        assert_eq!(sql.matches('?').count(), 3);
    }

    #[test]
    fn as_of_single_binds_entity_then_time() {
        let sql = as_of_single_sql("device", "entity_id");
        assert!(sql.contains("entity_id = ? AND snapshot_ts <= ?"));
    }

    #[test]
    fn as_of_batch_binds_time_first_then_ids() {
        let sql = as_of_batch_sql("device", "entity_id", 2);
        let time_pos = sql.find("snapshot_ts <= ?").unwrap();
        let ids_pos = sql.find("entity_id IN").unwrap();
        assert!(time_pos < ids_pos, "time bound must precede id list in argument order");
    }
}
