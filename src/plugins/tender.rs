//! Tenders: creation, versioned edits, rollback and status writes.

use crate::core::engine::Engine;
use crate::core::error;
use crate::core::history::{self, Patch, Versioned};
use crate::core::lifecycle;
use crate::core::model::{ServiceType, Status};
use crate::core::schemas;
use crate::core::time;
use crate::core::validate::{self, Page};
use crate::plugins::directory;
use clap::{Parser, Subcommand};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tender {
    pub id: String,
    pub name: String,
    pub description: String,
    pub service_type: ServiceType,
    pub status: Status,
    pub organization_id: String,
    pub creator_id: String,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial edit; `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenderPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub service_type: Option<ServiceType>,
}

impl Patch for TenderPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.service_type.is_none()
    }
}

impl TenderPatch {
    fn validate(&self) -> Result<(), error::TenderError> {
        if let Some(name) = &self.name {
            validate::name("tender name", name)?;
        }
        if let Some(description) = &self.description {
            validate::description("tender description", description)?;
        }
        Ok(())
    }
}

/// The editable fields of a tender as captured in `tender_history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenderContent {
    pub name: String,
    pub description: String,
    pub service_type: ServiceType,
}

/// One `tender_history` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenderRevision {
    pub id: String,
    pub tender_id: String,
    pub version: i64,
    #[serde(flatten)]
    pub content: TenderContent,
    pub created_at: String,
}

const TENDER_COLUMNS: &str = "id, name, description, service_type, status, organization_id, \
     creator_id, version, created_at, updated_at";

fn tender_from_row(row: &Row<'_>) -> rusqlite::Result<Tender> {
    Ok(Tender {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        service_type: row.get(3)?,
        status: row.get(4)?,
        organization_id: row.get(5)?,
        creator_id: row.get(6)?,
        version: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Versioned for Tender {
    type Patch = TenderPatch;
    type Snapshot = TenderContent;

    const ENTITY: &'static str = "tender";

    fn load(conn: &Connection, id: &str) -> Result<Self, error::TenderError> {
        conn.query_row(
            &format!("SELECT {} FROM tender WHERE id = ?1", TENDER_COLUMNS),
            params![id],
            tender_from_row,
        )
        .optional()?
        .ok_or_else(|| error::TenderError::NotFound(format!("tender '{}' not found", id)))
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64, updated_at: &str) {
        self.version = version;
        self.updated_at = updated_at.to_string();
    }

    fn snapshot(&self) -> TenderContent {
        TenderContent {
            name: self.name.clone(),
            description: self.description.clone(),
            service_type: self.service_type,
        }
    }

    fn apply(&mut self, patch: &TenderPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(service_type) = patch.service_type {
            self.service_type = service_type;
        }
    }

    fn restore(&mut self, snapshot: TenderContent) {
        self.name = snapshot.name;
        self.description = snapshot.description;
        self.service_type = snapshot.service_type;
    }

    fn load_snapshot(
        conn: &Connection,
        id: &str,
        version: i64,
    ) -> Result<Option<TenderContent>, error::TenderError> {
        let content = conn
            .query_row(
                "SELECT name, description, service_type FROM tender_history
                 WHERE tender_id = ?1 AND version = ?2",
                params![id, version],
                |row| {
                    Ok(TenderContent {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        service_type: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(content)
    }

    fn append_snapshot(
        conn: &Connection,
        id: &str,
        version: i64,
        snapshot: &TenderContent,
        at: &str,
    ) -> Result<(), error::TenderError> {
        conn.execute(
            "INSERT INTO tender_history(id, tender_id, name, description, service_type, version, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                time::new_id("TH"),
                id,
                snapshot.name,
                snapshot.description,
                snapshot.service_type,
                version,
                at
            ],
        )?;
        Ok(())
    }

    fn store_content(
        &self,
        conn: &Connection,
        expected_version: i64,
    ) -> Result<usize, error::TenderError> {
        Ok(conn.execute(
            "UPDATE tender
             SET name = ?1, description = ?2, service_type = ?3, version = ?4, updated_at = ?5
             WHERE id = ?6 AND version = ?7",
            params![
                self.name,
                self.description,
                self.service_type,
                self.version,
                self.updated_at,
                self.id,
                expected_version
            ],
        )?)
    }
}

pub fn initialize_tender_db(conn: &Connection) -> Result<(), error::TenderError> {
    conn.execute(schemas::TENDER_SCHEMA, [])?;
    conn.execute(schemas::TENDER_SCHEMA_HISTORY, [])?;
    conn.execute(schemas::TENDER_INDEX_SERVICE_TYPE, [])?;
    conn.execute(schemas::TENDER_INDEX_CREATOR, [])?;
    Ok(())
}

impl Engine {
    pub fn create_tender(
        &self,
        name: &str,
        description: &str,
        service_type: ServiceType,
        organization_id: &str,
        creator: &str,
    ) -> Result<Tender, error::TenderError> {
        validate::name("tender name", name)?;
        validate::description("tender description", description)?;
        validate::id("organization id", organization_id)?;
        let employee = self.principal(creator)?;
        self.require_responsible(creator, organization_id, "create tenders")?;

        let now = time::now_epoch_z();
        let tender = Tender {
            id: time::new_id("TN"),
            name: name.to_string(),
            description: description.to_string(),
            service_type,
            status: Status::Created,
            organization_id: organization_id.to_string(),
            creator_id: employee.id,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store().with_write("tender.create", |conn| {
            if !directory::organization_exists(conn, organization_id)? {
                return Err(error::TenderError::NotFound(format!(
                    "organization '{}' not found",
                    organization_id
                )));
            }
            conn.execute(
                &format!(
                    "INSERT INTO tender({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    TENDER_COLUMNS
                ),
                params![
                    tender.id,
                    tender.name,
                    tender.description,
                    tender.service_type,
                    tender.status,
                    tender.organization_id,
                    tender.creator_id,
                    tender.version,
                    tender.created_at,
                    tender.updated_at
                ],
            )?;
            Ok(())
        })?;
        tracing::info!(tender_id = %tender.id, organization_id, creator, "tender created");
        Ok(tender)
    }

    pub fn edit_tender(
        &self,
        tender_id: &str,
        patch: &TenderPatch,
        actor: &str,
    ) -> Result<Tender, error::TenderError> {
        validate::id("tender id", tender_id)?;
        patch.validate()?;
        self.authorize_tender(tender_id, actor, "edit tenders")?;
        self.store()
            .with_write("tender.edit", |conn| history::edit::<Tender>(conn, tender_id, patch))
    }

    pub fn rollback_tender(
        &self,
        tender_id: &str,
        target_version: i64,
        actor: &str,
    ) -> Result<Tender, error::TenderError> {
        validate::id("tender id", tender_id)?;
        self.authorize_tender(tender_id, actor, "roll back tenders")?;
        self.store().with_write("tender.rollback", |conn| {
            history::rollback::<Tender>(conn, tender_id, target_version)
        })
    }

    /// Status writes never touch the version counter.
    pub fn set_tender_status(
        &self,
        tender_id: &str,
        status: Status,
        actor: &str,
    ) -> Result<Tender, error::TenderError> {
        validate::id("tender id", tender_id)?;
        self.authorize_tender(tender_id, actor, "change tender status")?;
        let policy = self.config().status_transitions;
        let tender = self.store().with_write("tender.set_status", |conn| {
            let mut tender = Tender::load(conn, tender_id)?;
            lifecycle::check_transition(policy, Tender::ENTITY, tender.status, status)?;
            tender.status = status;
            tender.updated_at = time::now_epoch_z();
            conn.execute(
                "UPDATE tender SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![tender.status, tender.updated_at, tender.id],
            )?;
            Ok(tender)
        })?;
        tracing::info!(tender_id, status = %status, actor, "tender status set");
        Ok(tender)
    }

    /// Any known user may read a tender's status.
    pub fn tender_status(&self, tender_id: &str, username: &str) -> Result<Status, error::TenderError> {
        validate::id("tender id", tender_id)?;
        self.principal(username)?;
        Ok(self.load_tender(tender_id)?.status)
    }

    pub fn list_tenders(
        &self,
        service_types: &[ServiceType],
        page: Page,
    ) -> Result<Vec<Tender>, error::TenderError> {
        let mut sql = format!("SELECT {} FROM tender", TENDER_COLUMNS);
        let mut values: Vec<Value> = Vec::new();
        if !service_types.is_empty() {
            let marks = vec!["?"; service_types.len()].join(", ");
            sql.push_str(&format!(" WHERE service_type IN ({})", marks));
            values.extend(service_types.iter().map(|s| Value::Text(s.to_string())));
        }
        sql.push_str(" ORDER BY name, id LIMIT ? OFFSET ?");
        values.push(Value::Integer(page.limit.into()));
        values.push(Value::Integer(page.offset.into()));

        self.store().with_read("tender.list", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), tender_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Tenders created by `username`.
    pub fn list_my_tenders(&self, username: &str, page: Page) -> Result<Vec<Tender>, error::TenderError> {
        let employee = self.principal(username)?;
        self.store().with_read("tender.list_mine", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tender WHERE creator_id = ?1 ORDER BY name, id LIMIT ?2 OFFSET ?3",
                TENDER_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![employee.id, page.limit, page.offset],
                tender_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn tender_history(
        &self,
        tender_id: &str,
        username: &str,
    ) -> Result<Vec<TenderRevision>, error::TenderError> {
        validate::id("tender id", tender_id)?;
        self.authorize_tender(tender_id, username, "read tender history")?;
        self.store().with_read("tender.history", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tender_id, version, name, description, service_type, created_at
                 FROM tender_history WHERE tender_id = ?1 ORDER BY version",
            )?;
            let rows = stmt.query_map(params![tender_id], |row| {
                Ok(TenderRevision {
                    id: row.get(0)?,
                    tender_id: row.get(1)?,
                    version: row.get(2)?,
                    content: TenderContent {
                        name: row.get(3)?,
                        description: row.get(4)?,
                        service_type: row.get(5)?,
                    },
                    created_at: row.get(6)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub(crate) fn load_tender(&self, tender_id: &str) -> Result<Tender, error::TenderError> {
        self.store()
            .with_read("tender.get", |conn| Tender::load(conn, tender_id))
    }

    /// Resolve `actor`, load the tender and require responsibility for its organization.
    fn authorize_tender(
        &self,
        tender_id: &str,
        actor: &str,
        action: &str,
    ) -> Result<Tender, error::TenderError> {
        self.principal(actor)?;
        let tender = self.load_tender(tender_id)?;
        self.require_responsible(actor, &tender.organization_id, action)?;
        Ok(tender)
    }
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "tender", about = "Create, edit and publish tenders.")]
pub struct TenderCli {
    #[clap(subcommand)]
    pub command: TenderCommand,
}

#[derive(Subcommand, Debug)]
pub enum TenderCommand {
    /// Create a tender in status Created.
    New {
        #[clap(long)]
        name: String,
        #[clap(long)]
        description: String,
        #[clap(long)]
        service_type: ServiceType,
        #[clap(long)]
        organization: String,
        #[clap(long)]
        username: String,
    },
    /// List tenders, optionally filtered by service type.
    List {
        #[clap(long = "service-type")]
        service_types: Vec<ServiceType>,
        #[clap(long)]
        limit: Option<u32>,
        #[clap(long)]
        offset: Option<u32>,
    },
    /// List tenders created by a user.
    My {
        #[clap(long)]
        username: String,
        #[clap(long)]
        limit: Option<u32>,
        #[clap(long)]
        offset: Option<u32>,
    },
    /// Show a tender's status.
    Status {
        id: String,
        #[clap(long)]
        username: String,
    },
    /// Write a tender's status.
    SetStatus {
        id: String,
        status: Status,
        #[clap(long)]
        username: String,
    },
    /// Edit name, description or service type as a new version.
    Edit {
        id: String,
        #[clap(long)]
        username: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        description: Option<String>,
        #[clap(long)]
        service_type: Option<ServiceType>,
    },
    /// Restore the fields of an earlier version as a new version.
    Rollback {
        id: String,
        version: i64,
        #[clap(long)]
        username: String,
    },
    /// Show recorded prior versions.
    History {
        id: String,
        #[clap(long)]
        username: String,
    },
}

pub fn run_tender_cli(engine: &Engine, cli: TenderCli) -> Result<serde_json::Value, error::TenderError> {
    let out = match cli.command {
        TenderCommand::New {
            name,
            description,
            service_type,
            organization,
            username,
        } => {
            let tender =
                engine.create_tender(&name, &description, service_type, &organization, &username)?;
            time::command_envelope("tender.new", "ok", serde_json::json!({ "tender": tender }))
        }
        TenderCommand::List {
            service_types,
            limit,
            offset,
        } => {
            let tenders = engine.list_tenders(&service_types, engine.page(limit, offset)?)?;
            time::command_envelope("tender.list", "ok", serde_json::json!({ "tenders": tenders }))
        }
        TenderCommand::My {
            username,
            limit,
            offset,
        } => {
            let tenders = engine.list_my_tenders(&username, engine.page(limit, offset)?)?;
            time::command_envelope("tender.my", "ok", serde_json::json!({ "tenders": tenders }))
        }
        TenderCommand::Status { id, username } => {
            let status = engine.tender_status(&id, &username)?;
            time::command_envelope(
                "tender.status",
                "ok",
                serde_json::json!({ "tender_id": id, "tender_status": status }),
            )
        }
        TenderCommand::SetStatus {
            id,
            status,
            username,
        } => {
            let tender = engine.set_tender_status(&id, status, &username)?;
            time::command_envelope(
                "tender.set_status",
                "ok",
                serde_json::json!({ "tender": tender }),
            )
        }
        TenderCommand::Edit {
            id,
            username,
            name,
            description,
            service_type,
        } => {
            let patch = TenderPatch {
                name,
                description,
                service_type,
            };
            let tender = engine.edit_tender(&id, &patch, &username)?;
            time::command_envelope("tender.edit", "ok", serde_json::json!({ "tender": tender }))
        }
        TenderCommand::Rollback {
            id,
            version,
            username,
        } => {
            let tender = engine.rollback_tender(&id, version, &username)?;
            time::command_envelope(
                "tender.rollback",
                "ok",
                serde_json::json!({ "tender": tender }),
            )
        }
        TenderCommand::History { id, username } => {
            let history = engine.tender_history(&id, &username)?;
            time::command_envelope(
                "tender.history",
                "ok",
                serde_json::json!({ "tender_id": id, "history": history }),
            )
        }
    };
    Ok(out)
}
