//! SQL correction catalogs and their executor
//!
//! Corrections are declarative records, not imperative code: an ordered list
//! of statements, each carrying the idempotent-conflict error classes it is
//! allowed to ignore. Statements run one at a time in autocommit mode, so a
//! later statement never depends on an earlier one remaining uncommitted.

use sqlx::{MySqlConnection, PgConnection};

use crate::error::MigrateError;

/// Error classes a correction may declare as safe to ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreClass {
    /// The object the statement creates or renames-to already exists.
    AlreadyExists,
    /// The object the statement touches is not there.
    MissingObject,
}

/// One correction statement plus its tolerated conflicts.
#[derive(Debug, Clone)]
pub struct Correction {
    pub sql: String,
    pub ignore: &'static [IgnoreClass],
    /// Operator-facing context, logged when the statement runs.
    pub note: Option<&'static str>,
}

impl Correction {
    pub fn new(sql: impl Into<String>, ignore: &'static [IgnoreClass]) -> Self {
        Self {
            sql: sql.into(),
            ignore,
            note: None,
        }
    }

    pub fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }
}

// ============================================================================
// Source-side cleanup catalog (MySQL, before conversion)
// ============================================================================

/// Transient/log tables whose rows must not be carried into the target:
/// analytics summaries, clickstreams, cluster bookkeeping, integrity-check
/// scratch tables, reindex journal, notifications, publishing queues and the
/// license table.
pub const SOURCE_TRANSIENT_TABLES: &[&str] = &[
    "analytic_summary",
    "analytic_summary_404",
    "analytic_summary_content",
    "analytic_summary_pages",
    "analytic_summary_period",
    "analytic_summary_referer",
    "analytic_summary_visits",
    "analytic_summary_workstream",
    "clickstream",
    "clickstream_404",
    "clickstream_request",
    "cluster_server",
    "cluster_server_action",
    "cluster_server_uptime",
    "cms_roles_ir",
    "dist_reindex_journal",
    "dot_cluster",
    "fileassets_ir",
    "folders_ir",
    "htmlpages_ir",
    "indicies",
    "notification",
    "publishing_bundle_environment",
    "publishing_bundle",
    "publishing_pushed_assets",
    "publishing_queue",
    "publishing_queue_audit",
    "schemes_ir",
    "sitelic",
    "structures_ir",
    "system_event",
];

/// Columns declared tinyint(4) but used as booleans. pgloader only casts
/// tinyint(1) to postgres boolean, so they are narrowed before conversion.
pub const BOOLEAN_COLUMN_RETYPES: &[(&str, &str)] = &[
    ("company", "`autologin` tinyint(1)"),
    ("company", "`strangers` tinyint(1)"),
    ("portlet", "`narrow` tinyint(1)"),
    ("portlet", "`active_` tinyint(1)"),
    ("publishing_end_point", "`enabled` tinyint(1)"),
    ("publishing_end_point", "`sending` tinyint(1)"),
    ("sitesearch_audit", "`incremental` tinyint(1) NOT NULL"),
    ("sitesearch_audit", "`all_hosts` tinyint(1) NOT NULL"),
    ("sitesearch_audit", "`path_include` tinyint(1) NOT NULL"),
    ("user_", "`passwordencrypted` tinyint(1)"),
    ("user_", "`passwordreset` tinyint(1)"),
    ("user_", "`male` tinyint(1)"),
    ("user_", "`dottedskins` tinyint(1)"),
    ("user_", "`roundedskins` tinyint(1)"),
    ("user_", "`agreedtotermsofuse` tinyint(1)"),
    ("user_", "`active_` tinyint(1)"),
];

/// (statement, reason) corrections for schema migrations old source versions
/// may never have received.
pub const MISSING_SOURCE_MIGRATIONS: &[(&str, &str)] = &[(
    "CREATE INDEX workflow_idx_action_step ON workflow_action(step_id)",
    "dotCMS < 5.x may be missing this index",
)];

/// The ordered source-side cleanup catalog. Applying it twice produces the
/// same end state as applying it once.
pub fn source_cleanup_catalog() -> Vec<Correction> {
    let mut catalog = Vec::new();
    for table in SOURCE_TRANSIENT_TABLES {
        catalog.push(Correction::new(
            format!("DELETE FROM `{table}`"),
            &[IgnoreClass::MissingObject],
        ));
    }
    for (table, retype) in BOOLEAN_COLUMN_RETYPES {
        catalog.push(Correction::new(
            format!("ALTER TABLE `{table}` MODIFY {retype}"),
            &[],
        ));
    }
    for (sql, reason) in MISSING_SOURCE_MIGRATIONS {
        catalog.push(Correction::new(*sql, &[IgnoreClass::AlreadyExists]).with_note(reason));
    }
    catalog
}

// ============================================================================
// Executor
// ============================================================================

pub async fn apply_mysql(
    conn: &mut MySqlConnection,
    catalog: &[Correction],
) -> Result<(), MigrateError> {
    for correction in catalog {
        if let Some(note) = correction.note {
            tracing::info!(note, "correction context");
        }
        let outcome = sqlx::query(&correction.sql)
            .execute(&mut *conn)
            .await
            .map(|_| ());
        settle(outcome, correction, mysql_error_class)?;
    }
    Ok(())
}

pub async fn apply_pg(
    conn: &mut PgConnection,
    catalog: &[Correction],
) -> Result<(), MigrateError> {
    for correction in catalog {
        if let Some(note) = correction.note {
            tracing::info!(note, "correction context");
        }
        let outcome = sqlx::query(&correction.sql)
            .execute(&mut *conn)
            .await
            .map(|_| ());
        settle(outcome, correction, pg_error_class)?;
    }
    Ok(())
}

fn settle(
    outcome: Result<(), sqlx::Error>,
    correction: &Correction,
    classify: fn(&sqlx::Error) -> Option<IgnoreClass>,
) -> Result<(), MigrateError> {
    match outcome {
        Ok(()) => {
            tracing::info!(sql = %correction.sql, "applied");
            Ok(())
        }
        Err(err) => match classify(&err) {
            Some(class) if correction.ignore.contains(&class) => {
                tracing::warn!(sql = %correction.sql, %err, "ignoring expected conflict");
                Ok(())
            }
            _ => Err(MigrateError::Statement {
                sql: correction.sql.clone(),
                source: err,
            }),
        },
    }
}

pub fn mysql_error_class(err: &sqlx::Error) -> Option<IgnoreClass> {
    let db = err.as_database_error()?;
    let errno = db
        .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()?
        .number();
    class_for_mysql_errno(errno)
}

pub fn pg_error_class(err: &sqlx::Error) -> Option<IgnoreClass> {
    let code = err.as_database_error()?.code()?;
    class_for_pg_sqlstate(code.as_ref())
}

/// ER_TABLE_EXISTS_ERROR / ER_DUP_KEYNAME vs ER_CANT_DROP_FIELD_OR_KEY /
/// ER_NO_SUCH_TABLE.
pub fn class_for_mysql_errno(errno: u16) -> Option<IgnoreClass> {
    match errno {
        1050 | 1061 => Some(IgnoreClass::AlreadyExists),
        1091 | 1146 => Some(IgnoreClass::MissingObject),
        _ => None,
    }
}

/// duplicate_database / duplicate_schema / duplicate_table / duplicate_object
/// vs invalid_schema_name / undefined_object / undefined_table.
pub fn class_for_pg_sqlstate(code: &str) -> Option<IgnoreClass> {
    match code {
        "42P04" | "42P06" | "42P07" | "42710" => Some(IgnoreClass::AlreadyExists),
        "3F000" | "42704" | "42P01" => Some(IgnoreClass::MissingObject),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_preserves_declaration_order() {
        let catalog = source_cleanup_catalog();
        let first_alter = catalog
            .iter()
            .position(|c| c.sql.starts_with("ALTER"))
            .unwrap();
        let last_delete = catalog
            .iter()
            .rposition(|c| c.sql.starts_with("DELETE"))
            .unwrap();
        assert!(last_delete < first_alter, "deletions run before retypes");
        assert!(catalog.last().unwrap().sql.starts_with("CREATE INDEX"));
    }

    #[test]
    fn every_deletion_tolerates_a_missing_table() {
        for correction in source_cleanup_catalog() {
            if correction.sql.starts_with("DELETE") {
                assert!(
                    correction.ignore.contains(&IgnoreClass::MissingObject),
                    "{} must be idempotent",
                    correction.sql
                );
            }
        }
    }

    #[test]
    fn retypes_are_reapplicable() {
        // tinyint(1) -> tinyint(1) is a no-op MODIFY, so the catalog can run
        // twice without declaring any ignore class.
        for correction in source_cleanup_catalog() {
            if correction.sql.starts_with("ALTER TABLE") {
                assert!(correction.sql.contains("tinyint(1)"));
            }
        }
    }

    #[test]
    fn missing_index_correction_tolerates_duplicates() {
        let catalog = source_cleanup_catalog();
        let index_fix = catalog
            .iter()
            .find(|c| c.sql.contains("workflow_idx_action_step"))
            .expect("missing-index correction present");
        assert!(index_fix.ignore.contains(&IgnoreClass::AlreadyExists));
        assert!(index_fix.note.is_some());
    }

    #[test]
    fn catalog_covers_all_transient_tables() {
        let catalog = source_cleanup_catalog();
        for table in SOURCE_TRANSIENT_TABLES {
            assert!(catalog
                .iter()
                .any(|c| c.sql == format!("DELETE FROM `{table}`")));
        }
    }

    #[test]
    fn mysql_errno_classification() {
        assert_eq!(class_for_mysql_errno(1050), Some(IgnoreClass::AlreadyExists));
        assert_eq!(class_for_mysql_errno(1061), Some(IgnoreClass::AlreadyExists));
        assert_eq!(class_for_mysql_errno(1146), Some(IgnoreClass::MissingObject));
        assert_eq!(class_for_mysql_errno(1091), Some(IgnoreClass::MissingObject));
        // lock wait timeout is never ignorable
        assert_eq!(class_for_mysql_errno(1205), None);
    }

    #[test]
    fn pg_sqlstate_classification() {
        assert_eq!(
            class_for_pg_sqlstate("42P07"),
            Some(IgnoreClass::AlreadyExists)
        );
        assert_eq!(
            class_for_pg_sqlstate("42P06"),
            Some(IgnoreClass::AlreadyExists)
        );
        assert_eq!(
            class_for_pg_sqlstate("3F000"),
            Some(IgnoreClass::MissingObject)
        );
        assert_eq!(
            class_for_pg_sqlstate("42P01"),
            Some(IgnoreClass::MissingObject)
        );
        // serialization failures must abort the run
        assert_eq!(class_for_pg_sqlstate("40001"), None);
    }
}
