//! Schema migrations for the complaint store.
//!
//! Steps are numbered and recorded in `_migrations`. A step and its ledger
//! row commit together, so a crash mid-upgrade leaves the schema at the
//! last complete version.

use chrono::Utc;
use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version; append only.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS complaints (
                id TEXT PRIMARY KEY,
                ticket_number TEXT NOT NULL UNIQUE,
                student_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                assigned_to TEXT,
                assignment_rule_id TEXT,
                response_due_at TEXT,
                resolution_due_at TEXT,
                first_response_at TEXT,
                resolved_at TEXT,
                closed_at TEXT,
                sla_breached INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_complaints_status ON complaints(status);
            CREATE INDEX IF NOT EXISTS idx_complaints_student ON complaints(student_id);
            CREATE INDEX IF NOT EXISTS idx_complaints_assigned ON complaints(assigned_to);
            CREATE INDEX IF NOT EXISTS idx_complaints_created ON complaints(created_at);

            CREATE TABLE IF NOT EXISTS complaint_comments (
                id TEXT PRIMARY KEY,
                complaint_id TEXT NOT NULL REFERENCES complaints(id) ON DELETE CASCADE,
                author_id TEXT NOT NULL,
                body TEXT NOT NULL,
                is_internal INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_complaint_comments_complaint
                ON complaint_comments(complaint_id);

            CREATE TABLE IF NOT EXISTS ticket_counters (
                year INTEGER PRIMARY KEY,
                last_value INTEGER NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "assignment_rules",
        sql: r#"
            CREATE TABLE IF NOT EXISTS assignment_rules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                conditions TEXT NOT NULL DEFAULT '{}',
                assigned_to TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_assignment_rules_active
                ON assignment_rules(is_active, priority);
        "#,
    },
    Migration {
        version: 3,
        name: "sla_policies",
        sql: r#"
            CREATE TABLE IF NOT EXISTS sla_policies (
                priority TEXT PRIMARY KEY,
                response_hours INTEGER NOT NULL,
                resolution_hours INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            INSERT OR IGNORE INTO sla_policies (priority, response_hours, resolution_hours)
            VALUES ('urgent', 1, 24), ('high', 4, 72), ('medium', 24, 120), ('low', 48, 240);
        "#,
    },
];

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

/// Bring the schema up to the latest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(LEDGER_DDL, ())
        .await
        .map_err(migration_err("create ledger"))?;

    let from = schema_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        tracing::debug!(version = from, "Schema up to date");
        return Ok(());
    }

    for step in pending {
        apply(conn, step).await?;
        tracing::info!(version = step.version, name = step.name, "Applied schema migration");
    }
    Ok(())
}

/// Highest recorded version; 0 on a fresh database.
async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT MAX(version) FROM _migrations", ())
        .await
        .map_err(migration_err("read schema version"))?;
    let Some(row) = rows.next().await.map_err(migration_err("read schema version"))? else {
        return Ok(0);
    };
    let version: Option<i64> = row.get(0).map_err(migration_err("read schema version"))?;
    Ok(version.unwrap_or(0))
}

async fn apply(conn: &Connection, step: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: libsql::Error| {
        DatabaseError::Migration(format!("step {} ({}): {e}", step.version, step.name))
    };

    let tx = conn.transaction().await.map_err(failed)?;
    tx.execute_batch(step.sql).await.map_err(failed)?;
    tx.execute(
        "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        libsql::params![step.version, step.name, Utc::now().to_rfc3339()],
    )
    .await
    .map_err(failed)?;
    tx.commit().await.map_err(failed)
}

fn migration_err(what: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Migration(format!("{what}: {e}"))
}
