//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::assignment::rules::{AssignmentRule, RuleConditions};
use crate::complaints::model::{
    Category, Complaint, ComplaintComment, ComplaintFilter, ComplaintStatus, Priority,
};
use crate::error::DatabaseError;
use crate::sla::SlaPolicy;
use crate::store::migrations;
use crate::store::traits::Database;

/// Default page size when a filter gives no limit.
const DEFAULT_LIST_LIMIT: u32 = 200;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_complaints(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        context: &str,
    ) -> Result<Vec<Complaint>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))?;

        let mut complaints = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{context} row: {e}")))?
        {
            complaints.push(row_to_complaint(&row)?);
        }
        Ok(complaints)
    }

    async fn query_rules(&self, sql: &str, context: &str) -> Result<Vec<AssignmentRule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))?;

        let mut rules = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{context} row: {e}")))?
        {
            rules.push(row_to_rule(&row)?);
        }
        Ok(rules)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // RFC 3339 is our canonical write format
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // SQLite datetime() output with fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.filter(|s| !s.is_empty()).map(|s| parse_datetime(&s))
}

fn optional_uuid(s: Option<String>, field: &str) -> Result<Option<Uuid>, DatabaseError> {
    s.filter(|s| !s.is_empty())
        .map(|s| parse_uuid(&s, field))
        .transpose()
}

fn parse_uuid(s: &str, field: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("{field} parse: {e}")))
}

fn rfc3339(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.to_rfc3339())
}

/// Read a column, naming it in the error. The target type comes from the
/// binding unless given explicitly.
macro_rules! col {
    ($row:expr, $idx:expr, $ty:ty, $name:expr) => {
        $row.get::<$ty>($idx)
            .map_err(|e| DatabaseError::Query(format!("{}: {e}", $name)))
    };
    ($row:expr, $idx:expr, $name:expr) => {
        $row.get($idx)
            .map_err(|e| DatabaseError::Query(format!("{}: {e}", $name)))
    };
}

/// Column list for complaint SELECT queries (18 columns).
const COMPLAINT_COLUMNS: &str = "id, ticket_number, student_id, title, description, category_id, priority, status, assigned_to, assignment_rule_id, response_due_at, resolution_due_at, first_response_at, resolved_at, closed_at, sla_breached, created_at, updated_at";

fn row_to_complaint(row: &libsql::Row) -> Result<Complaint, DatabaseError> {
    let id: String = col!(row, 0, "complaint.id")?;
    let priority: String = col!(row, 6, "complaint.priority")?;
    let status: String = col!(row, 7, "complaint.status")?;
    let created_at: String = col!(row, 16, "complaint.created_at")?;
    let updated_at: String = col!(row, 17, "complaint.updated_at")?;

    Ok(Complaint {
        id: parse_uuid(&id, "complaint.id")?,
        ticket_number: col!(row, 1, "complaint.ticket_number")?,
        student_id: col!(row, 2, "complaint.student_id")?,
        title: col!(row, 3, "complaint.title")?,
        description: col!(row, 4, "complaint.description")?,
        category_id: optional_uuid(col!(row, 5, "complaint.category_id")?, "complaint.category_id")?,
        priority: priority
            .parse::<Priority>()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        status: status
            .parse::<ComplaintStatus>()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        assigned_to: col!(row, 8, Option<String>, "complaint.assigned_to")?
            .filter(|s| !s.is_empty()),
        assignment_rule_id: optional_uuid(
            col!(row, 9, "complaint.assignment_rule_id")?,
            "complaint.assignment_rule_id",
        )?,
        response_due_at: parse_optional_datetime(col!(row, 10, "complaint.response_due_at")?),
        resolution_due_at: parse_optional_datetime(col!(row, 11, "complaint.resolution_due_at")?),
        first_response_at: parse_optional_datetime(col!(row, 12, "complaint.first_response_at")?),
        resolved_at: parse_optional_datetime(col!(row, 13, "complaint.resolved_at")?),
        closed_at: parse_optional_datetime(col!(row, 14, "complaint.closed_at")?),
        sla_breached: col!(row, 15, i64, "complaint.sla_breached")? != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

const COMMENT_COLUMNS: &str = "id, complaint_id, author_id, body, is_internal, created_at";

fn row_to_comment(row: &libsql::Row) -> Result<ComplaintComment, DatabaseError> {
    let id: String = col!(row, 0, "comment.id")?;
    let complaint_id: String = col!(row, 1, "comment.complaint_id")?;
    let created_at: String = col!(row, 5, "comment.created_at")?;

    Ok(ComplaintComment {
        id: parse_uuid(&id, "comment.id")?,
        complaint_id: parse_uuid(&complaint_id, "comment.complaint_id")?,
        author_id: col!(row, 2, "comment.author_id")?,
        body: col!(row, 3, "comment.body")?,
        is_internal: col!(row, 4, i64, "comment.is_internal")? != 0,
        created_at: parse_datetime(&created_at),
    })
}

const CATEGORY_COLUMNS: &str = "id, name, description, is_active, created_at";

fn row_to_category(row: &libsql::Row) -> Result<Category, DatabaseError> {
    let id: String = col!(row, 0, "category.id")?;
    let created_at: String = col!(row, 4, "category.created_at")?;

    Ok(Category {
        id: parse_uuid(&id, "category.id")?,
        name: col!(row, 1, "category.name")?,
        description: col!(row, 2, Option<String>, "category.description")?
            .filter(|s| !s.is_empty()),
        is_active: col!(row, 3, i64, "category.is_active")? != 0,
        created_at: parse_datetime(&created_at),
    })
}

const RULE_COLUMNS: &str = "id, name, priority, is_active, conditions, assigned_to, created_at, updated_at";

fn row_to_rule(row: &libsql::Row) -> Result<AssignmentRule, DatabaseError> {
    let id: String = col!(row, 0, "rule.id")?;
    let conditions: String = col!(row, 4, "rule.conditions")?;
    let created_at: String = col!(row, 6, "rule.created_at")?;
    let updated_at: String = col!(row, 7, "rule.updated_at")?;

    let conditions: RuleConditions = serde_json::from_str(&conditions)
        .map_err(|e| DatabaseError::Serialization(format!("rule.conditions: {e}")))?;

    Ok(AssignmentRule {
        id: parse_uuid(&id, "rule.id")?,
        name: col!(row, 1, "rule.name")?,
        priority: i32::try_from(col!(row, 2, i64, "rule.priority")?)
            .map_err(|e| DatabaseError::Serialization(format!("rule.priority: {e}")))?,
        is_active: col!(row, 3, i64, "rule.is_active")? != 0,
        conditions,
        assigned_to: col!(row, 5, "rule.assigned_to")?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

const SLA_COLUMNS: &str = "priority, response_hours, resolution_hours, is_active";

fn row_to_sla(row: &libsql::Row) -> Result<SlaPolicy, DatabaseError> {
    let priority: String = col!(row, 0, "sla.priority")?;
    let response_hours: i64 = col!(row, 1, "sla.response_hours")?;
    let resolution_hours: i64 = col!(row, 2, "sla.resolution_hours")?;

    Ok(SlaPolicy {
        priority: priority
            .parse()
            .map_err(|e: crate::error::ComplaintError| DatabaseError::Serialization(e.to_string()))?,
        response_hours: u32::try_from(response_hours)
            .map_err(|e| DatabaseError::Serialization(format!("sla.response_hours: {e}")))?,
        resolution_hours: u32::try_from(resolution_hours)
            .map_err(|e| DatabaseError::Serialization(format!("sla.resolution_hours: {e}")))?,
        is_active: col!(row, 3, i64, "sla.is_active")? != 0,
    })
}

fn rule_conditions_json(rule: &AssignmentRule) -> Result<String, DatabaseError> {
    serde_json::to_string(&rule.conditions)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Build a WHERE clause and positional params for a complaint filter.
fn filter_clause(filter: &ComplaintFilter) -> (String, Vec<libsql::Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<libsql::Value> = Vec::new();

    let mut push = |column: &str, value: String| {
        values.push(libsql::Value::Text(value));
        clauses.push(format!("{column} = ?{}", values.len()));
    };

    if let Some(status) = filter.status {
        push("status", status.as_str().to_string());
    }
    if let Some(priority) = filter.priority {
        push("priority", priority.as_str().to_string());
    }
    if let Some(category) = filter.category_id {
        push("category_id", category.to_string());
    }
    if let Some(ref assignee) = filter.assigned_to {
        push("assigned_to", assignee.clone());
    }
    if let Some(ref student) = filter.student_id {
        push("student_id", student.clone());
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_sql, values)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Complaints ──────────────────────────────────────────────────

    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO complaints ({COMPLAINT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
            ),
            params![
                complaint.id.to_string(),
                complaint.ticket_number.as_str(),
                complaint.student_id.as_str(),
                complaint.title.as_str(),
                complaint.description.as_str(),
                complaint.category_id.map(|id| id.to_string()),
                complaint.priority.as_str(),
                complaint.status.as_str(),
                complaint.assigned_to.clone(),
                complaint.assignment_rule_id.map(|id| id.to_string()),
                rfc3339(complaint.response_due_at),
                rfc3339(complaint.resolution_due_at),
                rfc3339(complaint.first_response_at),
                rfc3339(complaint.resolved_at),
                rfc3339(complaint.closed_at),
                complaint.sla_breached as i64,
                complaint.created_at.to_rfc3339(),
                complaint.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") {
                DatabaseError::Constraint(format!("insert_complaint: {msg}"))
            } else {
                DatabaseError::Query(format!("insert_complaint: {msg}"))
            }
        })?;
        debug!(id = %complaint.id, ticket = %complaint.ticket_number, "Complaint inserted");
        Ok(())
    }

    async fn get_complaint(&self, id: Uuid) -> Result<Option<Complaint>, DatabaseError> {
        let mut found = self
            .query_complaints(
                &format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = ?1"),
                params![id.to_string()],
                "get_complaint",
            )
            .await?;
        Ok(found.pop())
    }

    async fn get_complaint_by_ticket(
        &self,
        ticket_number: &str,
    ) -> Result<Option<Complaint>, DatabaseError> {
        let mut found = self
            .query_complaints(
                &format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE ticket_number = ?1"),
                params![ticket_number],
                "get_complaint_by_ticket",
            )
            .await?;
        Ok(found.pop())
    }

    async fn list_complaints(
        &self,
        filter: &ComplaintFilter,
    ) -> Result<Vec<Complaint>, DatabaseError> {
        let (where_sql, mut values) = filter_clause(filter);
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        values.push(libsql::Value::Integer(i64::from(limit)));
        let sql = format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints {where_sql} \
             ORDER BY created_at DESC LIMIT ?{}",
            values.len()
        );
        self.query_complaints(&sql, Params::Positional(values), "list_complaints")
            .await
    }

    async fn list_complaints_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Complaint>, DatabaseError> {
        self.query_complaints(
            &format!(
                "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE created_at >= ?1 ORDER BY created_at ASC"
            ),
            params![since.to_rfc3339()],
            "list_complaints_since",
        )
        .await
    }

    async fn list_unresolved(&self) -> Result<Vec<Complaint>, DatabaseError> {
        self.query_complaints(
            &format!(
                "SELECT {COMPLAINT_COLUMNS} FROM complaints \
                 WHERE status IN ('open', 'in_progress') ORDER BY created_at DESC"
            ),
            (),
            "list_unresolved",
        )
        .await
    }

    async fn update_complaint(&self, complaint: &Complaint) -> Result<Complaint, DatabaseError> {
        let mut stored = self
            .query_complaints(
                &format!(
                    "UPDATE complaints SET title = ?1, description = ?2, category_id = ?3, \
                     priority = ?4, status = ?5, assigned_to = ?6, assignment_rule_id = ?7, \
                     response_due_at = ?8, resolution_due_at = ?9, first_response_at = ?10, \
                     resolved_at = ?11, closed_at = ?12, sla_breached = MAX(sla_breached, ?13), \
                     updated_at = ?14 WHERE id = ?15 RETURNING {COMPLAINT_COLUMNS}"
                ),
                params![
                    complaint.title.as_str(),
                    complaint.description.as_str(),
                    complaint.category_id.map(|id| id.to_string()),
                    complaint.priority.as_str(),
                    complaint.status.as_str(),
                    complaint.assigned_to.clone(),
                    complaint.assignment_rule_id.map(|id| id.to_string()),
                    rfc3339(complaint.response_due_at),
                    rfc3339(complaint.resolution_due_at),
                    rfc3339(complaint.first_response_at),
                    rfc3339(complaint.resolved_at),
                    rfc3339(complaint.closed_at),
                    complaint.sla_breached as i64,
                    complaint.updated_at.to_rfc3339(),
                    complaint.id.to_string(),
                ],
                "update_complaint",
            )
            .await?;

        stored.pop().ok_or_else(|| DatabaseError::NotFound {
            entity: "complaint".into(),
            id: complaint.id.to_string(),
        })
    }

    async fn mark_sla_breaches(&self, now: DateTime<Utc>) -> Result<Vec<Complaint>, DatabaseError> {
        let candidates = self
            .query_complaints(
                &format!(
                    "SELECT {COMPLAINT_COLUMNS} FROM complaints \
                     WHERE sla_breached = 0 AND status IN ('open', 'in_progress')"
                ),
                (),
                "mark_sla_breaches",
            )
            .await?;

        let mut flagged = Vec::new();
        for complaint in candidates.into_iter().filter(|c| c.is_past_due(now)) {
            // Re-check under the write: the row may have been resolved or
            // flagged since it was read.
            let updated = self
                .query_complaints(
                    &format!(
                        "UPDATE complaints SET sla_breached = 1, updated_at = ?1 \
                         WHERE id = ?2 AND sla_breached = 0 \
                         AND status IN ('open', 'in_progress') \
                         RETURNING {COMPLAINT_COLUMNS}"
                    ),
                    params![now.to_rfc3339(), complaint.id.to_string()],
                    "mark_sla_breaches update",
                )
                .await?;
            flagged.extend(updated);
        }
        Ok(flagged)
    }

    async fn next_ticket_sequence(&self, year: i32) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO ticket_counters (year, last_value) VALUES (?1, 1)
                 ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
                 RETURNING last_value",
                params![i64::from(year)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("next_ticket_sequence: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("next_ticket_sequence row: {e}")))?
            .ok_or_else(|| DatabaseError::Query("next_ticket_sequence: no row returned".into()))?;
        let value: i64 = col!(&row, 0, "ticket_counters.last_value")?;
        u64::try_from(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
    }

    // ── Comments ────────────────────────────────────────────────────

    async fn insert_comment(&self, comment: &ComplaintComment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO complaint_comments ({COMMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    comment.id.to_string(),
                    comment.complaint_id.to_string(),
                    comment.author_id.as_str(),
                    comment.body.as_str(),
                    comment.is_internal as i64,
                    comment.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_comment: {e}")))?;
        Ok(())
    }

    async fn list_comments(
        &self,
        complaint_id: Uuid,
        include_internal: bool,
    ) -> Result<Vec<ComplaintComment>, DatabaseError> {
        let visibility = if include_internal {
            ""
        } else {
            "AND is_internal = 0"
        };
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMMENT_COLUMNS} FROM complaint_comments \
                     WHERE complaint_id = ?1 {visibility} ORDER BY created_at ASC"
                ),
                params![complaint_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_comments: {e}")))?;

        let mut comments = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_comments row: {e}")))?
        {
            comments.push(row_to_comment(&row)?);
        }
        Ok(comments)
    }

    // ── Categories ──────────────────────────────────────────────────

    async fn insert_category(&self, category: &Category) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    category.id.to_string(),
                    category.name.as_str(),
                    category.description.clone(),
                    category.is_active as i64,
                    category.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") {
                    DatabaseError::Constraint(format!("category name already exists: {}", category.name))
                } else {
                    DatabaseError::Query(format!("insert_category: {msg}"))
                }
            })?;
        Ok(())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_category: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_category(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_category row: {e}"))),
        }
    }

    async fn list_categories(&self, include_inactive: bool) -> Result<Vec<Category>, DatabaseError> {
        let sql = if include_inactive {
            format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name ASC")
        } else {
            format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE is_active = 1 ORDER BY name ASC")
        };
        let mut rows = self
            .conn()
            .query(&sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_categories: {e}")))?;

        let mut categories = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_categories row: {e}")))?
        {
            categories.push(row_to_category(&row)?);
        }
        Ok(categories)
    }

    async fn update_category(&self, category: &Category) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE categories SET name = ?1, description = ?2, is_active = ?3 WHERE id = ?4",
                params![
                    category.name.as_str(),
                    category.description.clone(),
                    category.is_active as i64,
                    category.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_category: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "category".into(),
                id: category.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        // Foreign keys are not enforced by default; detach complaints explicitly.
        conn.execute(
            "UPDATE complaints SET category_id = NULL WHERE category_id = ?1",
            params![id.to_string()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("delete_category detach: {e}")))?;

        let count = conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_category: {e}")))?;
        Ok(count > 0)
    }

    // ── Assignment rules ────────────────────────────────────────────

    async fn insert_rule(&self, rule: &AssignmentRule) -> Result<(), DatabaseError> {
        let conditions = rule_conditions_json(rule)?;
        self.conn()
            .execute(
                &format!("INSERT INTO assignment_rules ({RULE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    rule.id.to_string(),
                    rule.name.as_str(),
                    i64::from(rule.priority),
                    rule.is_active as i64,
                    conditions,
                    rule.assigned_to.as_str(),
                    rule.created_at.to_rfc3339(),
                    rule.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_rule: {e}")))?;
        debug!(id = %rule.id, name = %rule.name, "Assignment rule created");
        Ok(())
    }

    async fn get_rule(&self, id: Uuid) -> Result<Option<AssignmentRule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM assignment_rules WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_rule: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_rule(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_rule row: {e}"))),
        }
    }

    async fn list_rules(&self) -> Result<Vec<AssignmentRule>, DatabaseError> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM assignment_rules ORDER BY priority DESC, created_at ASC, id ASC"
            ),
            "list_rules",
        )
        .await
    }

    async fn list_active_rules(&self) -> Result<Vec<AssignmentRule>, DatabaseError> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM assignment_rules WHERE is_active = 1 \
                 ORDER BY priority DESC, created_at ASC, id ASC"
            ),
            "list_active_rules",
        )
        .await
    }

    async fn update_rule(&self, rule: &AssignmentRule) -> Result<(), DatabaseError> {
        let conditions = rule_conditions_json(rule)?;
        let count = self
            .conn()
            .execute(
                "UPDATE assignment_rules SET name = ?1, priority = ?2, is_active = ?3, conditions = ?4, assigned_to = ?5, updated_at = ?6 WHERE id = ?7",
                params![
                    rule.name.as_str(),
                    i64::from(rule.priority),
                    rule.is_active as i64,
                    conditions,
                    rule.assigned_to.as_str(),
                    rule.updated_at.to_rfc3339(),
                    rule.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_rule: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "assignment_rule".into(),
                id: rule.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_rule(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM assignment_rules WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_rule: {e}")))?;
        Ok(count > 0)
    }

    // ── SLA policies ────────────────────────────────────────────────

    async fn list_sla_policies(&self) -> Result<Vec<SlaPolicy>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {SLA_COLUMNS} FROM sla_policies"), ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_sla_policies: {e}")))?;

        let mut policies = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_sla_policies row: {e}")))?
        {
            policies.push(row_to_sla(&row)?);
        }
        // Most urgent first.
        policies.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(policies)
    }

    async fn get_sla_policy(&self, priority: Priority) -> Result<Option<SlaPolicy>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SLA_COLUMNS} FROM sla_policies WHERE priority = ?1"),
                params![priority.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_sla_policy: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_sla(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_sla_policy row: {e}"))),
        }
    }

    async fn upsert_sla_policy(&self, policy: &SlaPolicy) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO sla_policies (priority, response_hours, resolution_hours, is_active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(priority) DO UPDATE SET
                    response_hours = excluded.response_hours,
                    resolution_hours = excluded.resolution_hours,
                    is_active = excluded.is_active,
                    updated_at = excluded.updated_at",
                params![
                    policy.priority.as_str(),
                    i64::from(policy.response_hours),
                    i64::from(policy.resolution_hours),
                    policy.is_active as i64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_sla_policy: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complaints::model::NewComplaint;
    use chrono::Duration;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_complaint(student: &str, ticket: &str) -> Complaint {
        Complaint::from_new(student, ticket, NewComplaint::new("Broken AC", "room is hot"))
    }

    // ── Complaint tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_get_complaint() {
        let db = test_db().await;
        let cat = Category::new("Hostel");
        db.insert_category(&cat).await.unwrap();

        let mut complaint = make_complaint("stu1", "CMP-2026-00001");
        complaint.category_id = Some(cat.id);
        complaint.priority = Priority::Urgent;
        complaint.assigned_to = Some("warden".into());
        complaint.response_due_at = Some(complaint.created_at + Duration::hours(1));
        db.insert_complaint(&complaint).await.unwrap();

        let fetched = db.get_complaint(complaint.id).await.unwrap().unwrap();
        assert_eq!(fetched.ticket_number, "CMP-2026-00001");
        assert_eq!(fetched.category_id, Some(cat.id));
        assert_eq!(fetched.priority, Priority::Urgent);
        assert_eq!(fetched.status, ComplaintStatus::Open);
        assert_eq!(fetched.assigned_to.as_deref(), Some("warden"));
        assert!(fetched.response_due_at.is_some());
        assert!(fetched.resolved_at.is_none());

        let by_ticket = db.get_complaint_by_ticket("CMP-2026-00001").await.unwrap().unwrap();
        assert_eq!(by_ticket.id, complaint.id);
    }

    #[tokio::test]
    async fn get_complaint_not_found() {
        let db = test_db().await;
        assert!(db.get_complaint(Uuid::new_v4()).await.unwrap().is_none());
        assert!(db.get_complaint_by_ticket("CMP-2026-99999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_ticket_is_constraint_error() {
        let db = test_db().await;
        db.insert_complaint(&make_complaint("a", "CMP-2026-00001")).await.unwrap();
        let err = db
            .insert_complaint(&make_complaint("b", "CMP-2026-00001"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn list_complaints_applies_filter() {
        let db = test_db().await;
        let mut urgent = make_complaint("alice", "CMP-2026-00001");
        urgent.priority = Priority::Urgent;
        db.insert_complaint(&urgent).await.unwrap();
        db.insert_complaint(&make_complaint("alice", "CMP-2026-00002")).await.unwrap();
        db.insert_complaint(&make_complaint("bob", "CMP-2026-00003")).await.unwrap();

        let all = db.list_complaints(&ComplaintFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let alice = db
            .list_complaints(&ComplaintFilter {
                student_id: Some("alice".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);

        let alice_urgent = db
            .list_complaints(&ComplaintFilter {
                student_id: Some("alice".into()),
                priority: Some(Priority::Urgent),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(alice_urgent.len(), 1);
        assert_eq!(alice_urgent[0].id, urgent.id);

        let limited = db
            .list_complaints(&ComplaintFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn update_complaint_persists_lifecycle() {
        let db = test_db().await;
        let mut complaint = make_complaint("stu", "CMP-2026-00001");
        db.insert_complaint(&complaint).await.unwrap();

        let now = Utc::now();
        complaint.transition(ComplaintStatus::Resolved, now).unwrap();
        complaint.assigned_to = Some("staff1".into());
        db.update_complaint(&complaint).await.unwrap();

        let fetched = db.get_complaint(complaint.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ComplaintStatus::Resolved);
        assert_eq!(fetched.assigned_to.as_deref(), Some("staff1"));
        assert!(fetched.resolved_at.is_some());
        assert!(fetched.first_response_at.is_some());
    }

    #[tokio::test]
    async fn update_missing_complaint_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_complaint(&make_complaint("stu", "CMP-2026-00001"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn mark_sla_breaches_flags_once() {
        let db = test_db().await;
        let now = Utc::now();

        let mut overdue = make_complaint("stu", "CMP-2026-00001");
        overdue.response_due_at = Some(now - Duration::hours(1));
        overdue.resolution_due_at = Some(now + Duration::hours(10));
        db.insert_complaint(&overdue).await.unwrap();

        let mut on_time = make_complaint("stu", "CMP-2026-00002");
        on_time.response_due_at = Some(now + Duration::hours(1));
        on_time.resolution_due_at = Some(now + Duration::hours(10));
        db.insert_complaint(&on_time).await.unwrap();

        let mut resolved = make_complaint("stu", "CMP-2026-00003");
        resolved.resolution_due_at = Some(now - Duration::hours(1));
        resolved.transition(ComplaintStatus::Resolved, now).unwrap();
        db.insert_complaint(&resolved).await.unwrap();

        let flagged = db.mark_sla_breaches(now).await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, overdue.id);
        assert!(flagged[0].sla_breached);
        assert_eq!(flagged[0].status, ComplaintStatus::Open);
        assert!(db.get_complaint(overdue.id).await.unwrap().unwrap().sla_breached);

        // Already flagged complaints are not reported again.
        assert!(db.mark_sla_breaches(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_columns_surface_as_errors() {
        let db = test_db().await;
        let complaint = make_complaint("stu", "CMP-2026-00001");
        db.insert_complaint(&complaint).await.unwrap();

        db.conn()
            .execute(
                "UPDATE complaints SET assignment_rule_id = 'not-a-uuid' WHERE id = ?1",
                params![complaint.id.to_string()],
            )
            .await
            .unwrap();
        let err = db.get_complaint(complaint.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));

        db.conn()
            .execute(
                "UPDATE complaints SET assignment_rule_id = NULL, sla_breached = 'yes' WHERE id = ?1",
                params![complaint.id.to_string()],
            )
            .await
            .unwrap();
        let err = db.get_complaint(complaint.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Query(_)));
    }

    #[tokio::test]
    async fn stale_write_keeps_breach_flag() {
        let db = test_db().await;
        let now = Utc::now();
        let mut complaint = make_complaint("stu", "CMP-2026-00001");
        complaint.response_due_at = Some(now - Duration::hours(1));
        db.insert_complaint(&complaint).await.unwrap();

        // Snapshot taken before the sweep runs.
        let mut stale = db.get_complaint(complaint.id).await.unwrap().unwrap();
        assert_eq!(db.mark_sla_breaches(now).await.unwrap().len(), 1);

        stale.transition(ComplaintStatus::InProgress, now).unwrap();
        let stored = db.update_complaint(&stale).await.unwrap();
        assert!(stored.sla_breached);
        assert_eq!(stored.status, ComplaintStatus::InProgress);
        assert!(db.get_complaint(complaint.id).await.unwrap().unwrap().sla_breached);
    }

    #[tokio::test]
    async fn list_unresolved_is_not_paged() {
        let db = test_db().await;
        let total = DEFAULT_LIST_LIMIT as usize + 5;
        for n in 1..=total {
            db.insert_complaint(&make_complaint("stu", &format!("CMP-2026-{n:05}")))
                .await
                .unwrap();
        }
        let mut closed = make_complaint("stu", "CMP-2026-99999");
        closed.transition(ComplaintStatus::Rejected, Utc::now()).unwrap();
        db.insert_complaint(&closed).await.unwrap();

        let unresolved = db.list_unresolved().await.unwrap();
        assert_eq!(unresolved.len(), total);
        assert!(unresolved.iter().all(|c| c.status.is_unresolved()));
        assert!(unresolved.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[tokio::test]
    async fn list_complaints_since_window() {
        let db = test_db().await;
        let mut old = make_complaint("stu", "CMP-2026-00001");
        old.created_at = Utc::now() - Duration::days(40);
        db.insert_complaint(&old).await.unwrap();
        db.insert_complaint(&make_complaint("stu", "CMP-2026-00002")).await.unwrap();

        let recent = db
            .list_complaints_since(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].ticket_number, "CMP-2026-00002");
    }

    #[tokio::test]
    async fn ticket_sequence_is_monotonic_per_year() {
        let db = test_db().await;
        assert_eq!(db.next_ticket_sequence(2026).await.unwrap(), 1);
        assert_eq!(db.next_ticket_sequence(2026).await.unwrap(), 2);
        assert_eq!(db.next_ticket_sequence(2027).await.unwrap(), 1);
        assert_eq!(db.next_ticket_sequence(2026).await.unwrap(), 3);
    }

    // ── Comment tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn comments_hide_internal_notes() {
        let db = test_db().await;
        let complaint = make_complaint("stu", "CMP-2026-00001");
        db.insert_complaint(&complaint).await.unwrap();

        db.insert_comment(&ComplaintComment::new(complaint.id, "staff1", "On it", false))
            .await
            .unwrap();
        db.insert_comment(&ComplaintComment::new(complaint.id, "staff1", "Student is rude", true))
            .await
            .unwrap();

        let all = db.list_comments(complaint.id, true).await.unwrap();
        assert_eq!(all.len(), 2);
        let public = db.list_comments(complaint.id, false).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].body, "On it");
    }

    // ── Category tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn category_crud() {
        let db = test_db().await;
        let mut cat = Category::new("Hostel").with_description("Rooms and mess");
        db.insert_category(&cat).await.unwrap();
        db.insert_category(&Category::new("Academics")).await.unwrap();

        let listed = db.list_categories(false).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Academics", "ordered by name");

        cat.is_active = false;
        db.update_category(&cat).await.unwrap();
        assert_eq!(db.list_categories(false).await.unwrap().len(), 1);
        assert_eq!(db.list_categories(true).await.unwrap().len(), 2);

        let fetched = db.get_category(cat.id).await.unwrap().unwrap();
        assert_eq!(fetched.description.as_deref(), Some("Rooms and mess"));

        assert!(db.delete_category(cat.id).await.unwrap());
        assert!(!db.delete_category(cat.id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_category_name_rejected() {
        let db = test_db().await;
        db.insert_category(&Category::new("Hostel")).await.unwrap();
        let err = db.insert_category(&Category::new("hostel")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn delete_category_detaches_complaints() {
        let db = test_db().await;
        let cat = Category::new("Transport");
        db.insert_category(&cat).await.unwrap();
        let mut complaint = make_complaint("stu", "CMP-2026-00001");
        complaint.category_id = Some(cat.id);
        db.insert_complaint(&complaint).await.unwrap();

        db.delete_category(cat.id).await.unwrap();
        let fetched = db.get_complaint(complaint.id).await.unwrap().unwrap();
        assert!(fetched.category_id.is_none());
    }

    // ── Rule tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn rule_roundtrip_preserves_conditions() {
        let db = test_db().await;
        let cat = Uuid::new_v4();
        let rule = AssignmentRule::new("hostel urgent", 10, "warden")
            .with_category(cat)
            .with_priority_condition(Priority::Urgent)
            .with_keywords(["water", "power"]);
        db.insert_rule(&rule).await.unwrap();

        let fetched = db.get_rule(rule.id).await.unwrap().unwrap();
        assert_eq!(fetched.conditions, rule.conditions);
        assert_eq!(fetched.priority, 10);
        assert!(fetched.is_active);
    }

    #[tokio::test]
    async fn active_rules_ordered_by_priority() {
        let db = test_db().await;
        db.insert_rule(&AssignmentRule::new("low", 1, "a")).await.unwrap();
        db.insert_rule(&AssignmentRule::new("high", 9, "b")).await.unwrap();
        db.insert_rule(&AssignmentRule::new("off", 50, "c").with_active(false))
            .await
            .unwrap();

        let active = db.list_active_rules().await.unwrap();
        let names: Vec<&str> = active.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);

        let all = db.list_rules().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "off");
    }

    #[tokio::test]
    async fn rule_update_and_delete() {
        let db = test_db().await;
        let mut rule = AssignmentRule::new("r", 1, "a");
        db.insert_rule(&rule).await.unwrap();

        rule.is_active = false;
        rule.assigned_to = "b".into();
        rule.conditions.keywords = vec!["exam".into()];
        db.update_rule(&rule).await.unwrap();

        let fetched = db.get_rule(rule.id).await.unwrap().unwrap();
        assert!(!fetched.is_active);
        assert_eq!(fetched.assigned_to, "b");
        assert_eq!(fetched.conditions.keywords, vec!["exam".to_string()]);

        assert!(db.delete_rule(rule.id).await.unwrap());
        assert!(db.get_rule(rule.id).await.unwrap().is_none());
        assert!(!db.delete_rule(rule.id).await.unwrap());
    }

    // ── SLA tests ───────────────────────────────────────────────────

    #[tokio::test]
    async fn sla_policies_seeded_and_upserted() {
        let db = test_db().await;
        let policies = db.list_sla_policies().await.unwrap();
        assert_eq!(policies.len(), 4);
        assert_eq!(policies[0].priority, Priority::Urgent);

        db.upsert_sla_policy(&SlaPolicy::new(Priority::Urgent, 2, 12))
            .await
            .unwrap();
        let urgent = db.get_sla_policy(Priority::Urgent).await.unwrap().unwrap();
        assert_eq!(urgent.response_hours, 2);
        assert_eq!(urgent.resolution_hours, 12);
        assert_eq!(db.list_sla_policies().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn open_local_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("cms.db");
        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        assert!(db_path.exists());
        db.run_migrations().await.unwrap();
    }
}
