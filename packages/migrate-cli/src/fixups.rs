//! Target-side corrections applied after pgloader finishes
//!
//! pgloader lands the converted tables in a schema named after the source
//! database, auto-names primary-key constraints from internal index oids, and
//! names sequences after the mysql auto-increment columns. dotCMS expects
//! none of that, so: promote the schema, rename the primary keys and
//! sequences to the conventions the application looks up, and reset the
//! Quartz scheduler bookkeeping so it can initialize cleanly on first boot.

use sqlx::PgConnection;

use crate::corrections::{apply_pg, Correction, IgnoreClass};
use crate::error::MigrateError;

/// Tables whose primary keys use fixed `pk_*` names instead of the
/// `{table}_pkey` convention. Whatever constraint name pgloader produced is
/// renamed to the fixed name, never to the generic pattern.
pub const PK_SPECIAL_CASES: &[(&str, &str)] = &[
    ("notification", "pk_notification"),
    ("system_event", "pk_system_event"),
    ("workflow_action_step", "pk_workflow_action_step"),
];

/// Sequences whose dotCMS names differ structurally from what pgloader
/// derives out of the mysql auto-increment columns.
pub const SEQUENCE_RENAMES: &[(&str, &str)] = &[
    ("clickstream_clickstream_id_seq", "clickstream_seq"),
    (
        "clickstream_request_clickstream_request_id_seq",
        "clickstream_request_seq",
    ),
    ("clickstream_404_clickstream_404_id_seq", "clickstream_404_seq"),
    ("content_rating_id_seq", "content_rating_sequence"),
    ("dashboard_user_preferences_id_seq", "dashboard_usrpref_seq"),
    ("trackback_id_seq", "trackback_sequence"),
    ("users_to_delete_id_seq", "user_to_delete_seq"),
];

/// Sequences that only need `_id_` collapsed to `_`.
pub const SEQUENCE_ID_COLLAPSE: &[&str] = &[
    "chain_link_code_id_seq",
    "chain_id_seq",
    "chain_state_parameter_id_seq",
    "chain_state_id_seq",
    "permission_reference_id_seq",
    "permission_id_seq",
    "user_preferences_id_seq",
];

pub const QRTZ_LOCK_TABLES: &[&str] = &["qrtz_locks", "qrtz_excl_locks"];

/// Lock-name rows Quartz requires before it will start.
pub const QRTZ_LOCK_NAMES: &[&str] = &[
    "TRIGGER_ACCESS",
    "JOB_ACCESS",
    "CALENDAR_ACCESS",
    "STATE_ACCESS",
    "MISFIRE_ACCESS",
];

/// Purge order matters: children before parents, per the foreign keys.
/// Site-search entries are the one job group that must survive.
pub const QRTZ_PURGE_TARGETS: &[&str] = &[
    "qrtz_excl_fired_triggers",
    "qrtz_excl_cron_triggers where trigger_group <> 'sitesearch'",
    "qrtz_excl_simple_triggers where trigger_group <> 'sitesearch'",
    "qrtz_excl_triggers where trigger_group <> 'sitesearch'",
    "qrtz_excl_scheduler_state",
    "qrtz_excl_job_details where job_group <> 'sitesearch'",
    "qrtz_fired_triggers",
    "qrtz_cron_triggers",
    "qrtz_triggers",
    "qrtz_scheduler_state",
    "qrtz_job_details",
];

/// `idx_<numeric id>_primary`: the shape pgloader invents for primary keys
/// it had to name itself.
pub fn is_autogenerated_pk(constraint: &str) -> bool {
    constraint
        .strip_prefix("idx_")
        .and_then(|rest| rest.strip_suffix("_primary"))
        .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

/// Canonical name for a discovered primary-key constraint, or `None` when
/// the existing name should be left alone.
pub fn pk_target_name(table: &str, constraint: &str) -> Option<String> {
    if let Some((_, fixed)) = PK_SPECIAL_CASES.iter().find(|(t, _)| *t == table) {
        return (constraint != *fixed).then(|| (*fixed).to_string());
    }
    is_autogenerated_pk(constraint).then(|| format!("{table}_pkey"))
}

/// Rename statements for a discovered (table, primary-key constraints)
/// listing. Tables with no primary key contribute nothing.
pub fn plan_pk_renames(discovered: &[(String, Vec<String>)]) -> Vec<String> {
    let mut statements = Vec::new();
    for (table, constraints) in discovered {
        for constraint in constraints {
            if let Some(target) = pk_target_name(table, constraint) {
                statements.push(format!(
                    "ALTER TABLE {table} RENAME CONSTRAINT {constraint} TO {target}"
                ));
            }
        }
    }
    statements
}

/// Rename the converted schema into place so the application finds its
/// tables without qualification.
pub fn schema_promotion_catalog(source_schema: &str) -> Vec<Correction> {
    vec![
        Correction::new(
            "ALTER SCHEMA public RENAME TO public_old",
            &[IgnoreClass::AlreadyExists],
        ),
        Correction::new(
            format!("ALTER SCHEMA {source_schema} RENAME TO public"),
            &[IgnoreClass::MissingObject],
        ),
    ]
}

fn sequence_rename_catalog() -> Vec<Correction> {
    const TOLERATED: &[IgnoreClass] = &[IgnoreClass::AlreadyExists, IgnoreClass::MissingObject];
    let mut catalog = Vec::new();
    for (from, to) in SEQUENCE_RENAMES {
        catalog.push(Correction::new(
            format!("ALTER TABLE {from} RENAME TO {to}"),
            TOLERATED,
        ));
    }
    for from in SEQUENCE_ID_COLLAPSE {
        let to = from.replace("_id_", "_");
        catalog.push(Correction::new(
            format!("ALTER TABLE {from} RENAME TO {to}"),
            TOLERATED,
        ));
    }
    catalog
}

fn scheduler_reset_catalog() -> Vec<Correction> {
    let mut catalog = Vec::new();
    for table in QRTZ_LOCK_TABLES {
        catalog.push(Correction::new(format!("DELETE FROM {table}"), &[]));
        for lock in QRTZ_LOCK_NAMES {
            catalog.push(Correction::new(
                format!("INSERT INTO {table} VALUES ('{lock}')"),
                &[],
            ));
        }
    }
    for target in QRTZ_PURGE_TARGETS {
        catalog.push(Correction::new(format!("DELETE FROM {target}"), &[]));
    }
    catalog
}

/// The full target-side fixup pass, in dependency order.
pub async fn apply(
    conn: &mut PgConnection,
    db_name: &str,
    source_schema: &str,
) -> Result<(), MigrateError> {
    apply_pg(conn, &schema_promotion_catalog(source_schema)).await?;
    apply_pg(conn, &sequence_rename_catalog()).await?;
    rename_primary_keys(conn, db_name).await?;
    apply_pg(conn, &scheduler_reset_catalog()).await?;
    Ok(())
}

/// Two-level discovery: list every table in the promoted schema, then each
/// table's PRIMARY KEY constraint, and rename the ones that need it. Tables
/// without a primary key are skipped without error.
async fn rename_primary_keys(conn: &mut PgConnection, db_name: &str) -> Result<(), MigrateError> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_catalog = $1",
    )
    .bind(db_name)
    .fetch_all(&mut *conn)
    .await?;

    let mut discovered = Vec::with_capacity(tables.len());
    for table in tables {
        let constraints: Vec<String> = sqlx::query_scalar(
            "SELECT constraint_name FROM information_schema.table_constraints \
             WHERE table_schema = 'public' AND constraint_type = 'PRIMARY KEY' \
             AND table_name = $1",
        )
        .bind(&table)
        .fetch_all(&mut *conn)
        .await?;
        discovered.push((table, constraints));
    }

    for sql in plan_pk_renames(&discovered) {
        sqlx::query(&sql)
            .execute(&mut *conn)
            .await
            .map_err(|source| MigrateError::Statement {
                sql: sql.clone(),
                source,
            })?;
        tracing::info!(%sql, "renamed primary key");
    }
    Ok(())
}
