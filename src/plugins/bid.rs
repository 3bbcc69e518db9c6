//! Bids against published tenders.
//!
//! A bid is authored either by a single employee (`User`) or on behalf of an
//! organization (`Organization`). Content edits and rollbacks go through the
//! shared history manager; `status` and `coordination` are only moved to
//! `Closed` by the decision protocol in [`crate::plugins::decision`].

use crate::core::engine::Engine;
use crate::core::error;
use crate::core::history::{self, Patch, Versioned};
use crate::core::lifecycle;
use crate::core::model::{AuthorType, Coordination, Status, Verdict};
use crate::core::schemas;
use crate::core::time;
use crate::core::validate::{self, Page};
use crate::plugins::decision::{self, UserDecision};
use crate::plugins::directory;
use crate::plugins::feedback::{self, Feedback};
use crate::plugins::tender::Tender;
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bid {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub tender_id: String,
    pub author_type: AuthorType,
    pub author_id: String,
    pub version: i64,
    pub coordination: Coordination,
    /// Recorded decisions in submission order.
    pub decisions: Vec<UserDecision>,
    /// Feedback entries in submission order.
    pub feedback: Vec<Feedback>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BidPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Patch for BidPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BidContent {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BidRevision {
    pub id: String,
    pub bid_id: String,
    pub version: i64,
    #[serde(flatten)]
    pub content: BidContent,
    pub created_at: String,
}

const BID_COLUMNS: &str = "id, name, description, status, tender_id, author_type, author_id, \
     version, coordination, created_at, updated_at";

fn bid_from_row(row: &Row<'_>) -> rusqlite::Result<Bid> {
    Ok(Bid {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        tender_id: row.get(4)?,
        author_type: row.get(5)?,
        author_id: row.get(6)?,
        version: row.get(7)?,
        coordination: row.get(8)?,
        decisions: Vec::new(),
        feedback: Vec::new(),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn with_children(conn: &Connection, mut bid: Bid) -> Result<Bid, error::TenderError> {
    bid.decisions = decision::decisions_for(conn, &bid.id)?;
    bid.feedback = feedback::feedback_for(conn, &bid.id)?;
    Ok(bid)
}

fn query_bids(
    conn: &Connection,
    where_clause: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Bid>, error::TenderError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM bid WHERE {} ORDER BY name, id LIMIT ? OFFSET ?",
        BID_COLUMNS, where_clause
    ))?;
    let bids = stmt
        .query_map(params, bid_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    bids.into_iter().map(|b| with_children(conn, b)).collect()
}

impl Versioned for Bid {
    type Patch = BidPatch;
    type Snapshot = BidContent;

    const ENTITY: &'static str = "bid";

    fn load(conn: &Connection, id: &str) -> Result<Self, error::TenderError> {
        let bid = conn
            .query_row(
                &format!("SELECT {} FROM bid WHERE id = ?1", BID_COLUMNS),
                params![id],
                bid_from_row,
            )
            .optional()?
            .ok_or_else(|| error::TenderError::NotFound(format!("bid '{}' not found", id)))?;
        with_children(conn, bid)
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

    fn snapshot(&self) -> BidContent {
        BidContent {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    fn apply(&mut self, patch: &BidPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
    }

    fn restore(&mut self, snapshot: BidContent) {
        self.name = snapshot.name;
        self.description = snapshot.description;
    }

    fn load_snapshot(
        conn: &Connection,
        id: &str,
        version: i64,
    ) -> Result<Option<BidContent>, error::TenderError> {
        Ok(conn
            .query_row(
                "SELECT name, description FROM bid_history WHERE bid_id = ?1 AND version = ?2",
                params![id, version],
                |row| {
                    Ok(BidContent {
                        name: row.get(0)?,
                        description: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn append_snapshot(
        conn: &Connection,
        id: &str,
        version: i64,
        snapshot: &BidContent,
        at: &str,
    ) -> Result<(), error::TenderError> {
        conn.execute(
            "INSERT INTO bid_history(id, bid_id, name, description, version, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                time::new_id("BH"),
                id,
                snapshot.name,
                snapshot.description,
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
            "UPDATE bid SET name = ?1, description = ?2, version = ?3, updated_at = ?4
             WHERE id = ?5 AND version = ?6",
            params![
                self.name,
                self.description,
                self.version,
                self.updated_at,
                self.id,
                expected_version
            ],
        )?)
    }
}

pub fn initialize_bid_db(conn: &Connection) -> Result<(), error::TenderError> {
    conn.execute(schemas::BID_SCHEMA, [])?;
    conn.execute(schemas::BID_SCHEMA_HISTORY, [])?;
    conn.execute(schemas::BID_INDEX_TENDER, [])?;
    conn.execute(schemas::BID_INDEX_AUTHOR, [])?;
    Ok(())
}

impl Engine {
    /// Submit a bid against a published tender. `author_id` is an employee id
    /// for `User` bids and an organization id for `Organization` bids.
    pub fn create_bid(
        &self,
        name: &str,
        description: &str,
        tender_id: &str,
        author_type: AuthorType,
        author_id: &str,
    ) -> Result<Bid, error::TenderError> {
        validate::name("bid name", name)?;
        validate::description("bid description", description)?;
        validate::id("tender id", tender_id)?;
        validate::id("author id", author_id)?;

        let bid = self.store().with_write("bid.create", |conn| {
            let tender = Tender::load(conn, tender_id)?;
            let author_exists = match author_type {
                AuthorType::User => directory::employee_exists(conn, author_id)?,
                AuthorType::Organization => directory::organization_exists(conn, author_id)?,
            };
            if !author_exists {
                return Err(error::TenderError::NotFound(format!(
                    "{} author '{}' not found",
                    author_type, author_id
                )));
            }
            lifecycle::require_published("tender", &tender.id, tender.status)?;

            let now = time::now_epoch_z();
            let bid = Bid {
                id: time::new_id("BD"),
                name: name.to_string(),
                description: description.to_string(),
                status: Status::Created,
                tender_id: tender.id,
                author_type,
                author_id: author_id.to_string(),
                version: 1,
                coordination: Coordination::Expectation,
                decisions: Vec::new(),
                feedback: Vec::new(),
                created_at: now.clone(),
                updated_at: now,
            };
            conn.execute(
                &format!(
                    "INSERT INTO bid({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    BID_COLUMNS
                ),
                params![
                    bid.id,
                    bid.name,
                    bid.description,
                    bid.status,
                    bid.tender_id,
                    bid.author_type,
                    bid.author_id,
                    bid.version,
                    bid.coordination,
                    bid.created_at,
                    bid.updated_at
                ],
            )?;
            Ok(bid)
        })?;
        tracing::info!(bid_id = %bid.id, tender_id, author_type = %author_type, author_id, "bid created");
        Ok(bid)
    }

    pub fn edit_bid(
        &self,
        bid_id: &str,
        patch: &BidPatch,
        actor: &str,
    ) -> Result<Bid, error::TenderError> {
        validate::id("bid id", bid_id)?;
        if let Some(name) = &patch.name {
            validate::name("bid name", name)?;
        }
        if let Some(description) = &patch.description {
            validate::description("bid description", description)?;
        }
        self.authorize_bid_author(bid_id, actor, "edit this bid")?;
        self.store()
            .with_write("bid.edit", |conn| history::edit::<Bid>(conn, bid_id, patch))
    }

    pub fn rollback_bid(
        &self,
        bid_id: &str,
        target_version: i64,
        actor: &str,
    ) -> Result<Bid, error::TenderError> {
        validate::id("bid id", bid_id)?;
        self.authorize_bid_author(bid_id, actor, "roll back this bid")?;
        self.store().with_write("bid.rollback", |conn| {
            history::rollback::<Bid>(conn, bid_id, target_version)
        })
    }

    /// Author-side status write (publish or withdraw to Created).
    pub fn set_bid_status(
        &self,
        bid_id: &str,
        status: Status,
        actor: &str,
    ) -> Result<Bid, error::TenderError> {
        validate::id("bid id", bid_id)?;
        self.authorize_bid_author(bid_id, actor, "change this bid's status")?;
        let policy = self.config().status_transitions;
        let bid = self.store().with_write("bid.set_status", |conn| {
            let mut bid = Bid::load(conn, bid_id)?;
            lifecycle::check_bid_status_write(policy, &bid.id, bid.status, status)?;
            bid.status = status;
            bid.updated_at = time::now_epoch_z();
            let changed = conn.execute(
                "UPDATE bid SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND coordination = 'Expectation'",
                params![bid.status, bid.updated_at, bid.id],
            )?;
            if changed == 0 {
                return Err(error::TenderError::PreconditionFailed(format!(
                    "bid '{}' already has an outcome",
                    bid.id
                )));
            }
            Ok(bid)
        })?;
        tracing::info!(bid_id, status = %status, actor, "bid status set");
        Ok(bid)
    }

    /// Visible to the bid's author side and to the tender organization's responsible users.
    pub fn bid_status(&self, bid_id: &str, username: &str) -> Result<Status, error::TenderError> {
        validate::id("bid id", bid_id)?;
        self.principal(username)?;
        let bid = self.load_bid(bid_id)?;
        if self.authorize_author(&bid, username, "read this bid").is_ok() {
            return Ok(bid.status);
        }
        let tender = self.load_tender(&bid.tender_id)?;
        self.require_responsible(username, &tender.organization_id, "read this bid")?;
        Ok(bid.status)
    }

    /// Bids on a tender, for users responsible for the tender's organization.
    pub fn list_bids_for_tender(
        &self,
        tender_id: &str,
        requester: &str,
        page: Page,
    ) -> Result<Vec<Bid>, error::TenderError> {
        validate::id("tender id", tender_id)?;
        self.principal(requester)?;
        let tender = self.load_tender(tender_id)?;
        self.require_responsible(requester, &tender.organization_id, "list bids for this tender")?;
        self.store().with_read("bid.list_for_tender", |conn| {
            query_bids(
                conn,
                "tender_id = ?",
                params![tender.id, page.limit, page.offset],
            )
        })
    }

    /// Bids authored personally by `username`.
    pub fn list_my_bids(&self, username: &str, page: Page) -> Result<Vec<Bid>, error::TenderError> {
        let employee = self.principal(username)?;
        self.store().with_read("bid.list_mine", |conn| {
            query_bids(
                conn,
                "author_type = 'User' AND author_id = ?",
                params![employee.id, page.limit, page.offset],
            )
        })
    }

    pub fn bid_history(&self, bid_id: &str, username: &str) -> Result<Vec<BidRevision>, error::TenderError> {
        validate::id("bid id", bid_id)?;
        self.authorize_bid_author(bid_id, username, "read this bid's history")?;
        self.store().with_read("bid.history", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, bid_id, version, name, description, created_at
                 FROM bid_history WHERE bid_id = ?1 ORDER BY version",
            )?;
            let rows = stmt.query_map(params![bid_id], |row| {
                Ok(BidRevision {
                    id: row.get(0)?,
                    bid_id: row.get(1)?,
                    version: row.get(2)?,
                    content: BidContent {
                        name: row.get(3)?,
                        description: row.get(4)?,
                    },
                    created_at: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub(crate) fn load_bid(&self, bid_id: &str) -> Result<Bid, error::TenderError> {
        self.store().with_read("bid.get", |conn| Bid::load(conn, bid_id))
    }

    fn authorize_bid_author(
        &self,
        bid_id: &str,
        actor: &str,
        action: &str,
    ) -> Result<Bid, error::TenderError> {
        self.principal(actor)?;
        let bid = self.load_bid(bid_id)?;
        self.authorize_author(&bid, actor, action)?;
        Ok(bid)
    }

    /// `User` bids belong to their author; `Organization` bids to its responsible users.
    fn authorize_author(&self, bid: &Bid, actor: &str, action: &str) -> Result<(), error::TenderError> {
        match bid.author_type {
            AuthorType::User => {
                let employee = self.principal(actor)?;
                if employee.id != bid.author_id {
                    return Err(error::TenderError::Forbidden(format!(
                        "user '{}' is not the author of bid '{}' and cannot {}",
                        actor, bid.id, action
                    )));
                }
                Ok(())
            }
            AuthorType::Organization => self.require_responsible(actor, &bid.author_id, action),
        }
    }
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "bid", about = "Submit, edit and decide on bids.")]
pub struct BidCli {
    #[clap(subcommand)]
    pub command: BidCommand,
}

#[derive(Subcommand, Debug)]
pub enum BidCommand {
    /// Submit a bid against a published tender.
    New {
        #[clap(long)]
        name: String,
        #[clap(long)]
        description: String,
        #[clap(long)]
        tender: String,
        /// User or Organization.
        #[clap(long)]
        author_type: AuthorType,
        /// Employee id for User bids, organization id for Organization bids.
        #[clap(long)]
        author: String,
    },
    /// List bids on a tender.
    List {
        tender: String,
        #[clap(long)]
        username: String,
        #[clap(long)]
        limit: Option<u32>,
        #[clap(long)]
        offset: Option<u32>,
    },
    /// List bids authored by a user.
    My {
        #[clap(long)]
        username: String,
        #[clap(long)]
        limit: Option<u32>,
        #[clap(long)]
        offset: Option<u32>,
    },
    /// Show a bid's status.
    Status {
        id: String,
        #[clap(long)]
        username: String,
    },
    /// Publish a bid or move it back to Created.
    SetStatus {
        id: String,
        status: Status,
        #[clap(long)]
        username: String,
    },
    /// Edit name or description as a new version.
    Edit {
        id: String,
        #[clap(long)]
        username: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        description: Option<String>,
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
    /// Record an Approved or Rejected decision.
    Decide {
        id: String,
        decision: Verdict,
        #[clap(long)]
        username: String,
    },
    /// Finish closing the competitors of an approved bid.
    CloseCompetitors {
        id: String,
        #[clap(long)]
        username: String,
    },
    /// Leave feedback on a bid.
    Feedback {
        id: String,
        #[clap(long)]
        text: String,
        #[clap(long)]
        username: String,
    },
    /// List feedback left on an author's bids for a tender.
    Reviews {
        tender: String,
        #[clap(long)]
        author: String,
        #[clap(long)]
        username: String,
        #[clap(long)]
        limit: Option<u32>,
        #[clap(long)]
        offset: Option<u32>,
    },
}

pub fn run_bid_cli(engine: &Engine, cli: BidCli) -> Result<serde_json::Value, error::TenderError> {
    let out = match cli.command {
        BidCommand::New {
            name,
            description,
            tender,
            author_type,
            author,
        } => {
            let bid = engine.create_bid(&name, &description, &tender, author_type, &author)?;
            time::command_envelope("bid.new", "ok", serde_json::json!({ "bid": bid }))
        }
        BidCommand::List {
            tender,
            username,
            limit,
            offset,
        } => {
            let bids = engine.list_bids_for_tender(&tender, &username, engine.page(limit, offset)?)?;
            time::command_envelope("bid.list", "ok", serde_json::json!({ "bids": bids }))
        }
        BidCommand::My {
            username,
            limit,
            offset,
        } => {
            let bids = engine.list_my_bids(&username, engine.page(limit, offset)?)?;
            time::command_envelope("bid.my", "ok", serde_json::json!({ "bids": bids }))
        }
        BidCommand::Status { id, username } => {
            let status = engine.bid_status(&id, &username)?;
            time::command_envelope(
                "bid.status",
                "ok",
                serde_json::json!({ "bid_id": id, "bid_status": status }),
            )
        }
        BidCommand::SetStatus {
            id,
            status,
            username,
        } => {
            let bid = engine.set_bid_status(&id, status, &username)?;
            time::command_envelope("bid.set_status", "ok", serde_json::json!({ "bid": bid }))
        }
        BidCommand::Edit {
            id,
            username,
            name,
            description,
        } => {
            let bid = engine.edit_bid(&id, &BidPatch { name, description }, &username)?;
            time::command_envelope("bid.edit", "ok", serde_json::json!({ "bid": bid }))
        }
        BidCommand::Rollback {
            id,
            version,
            username,
        } => {
            let bid = engine.rollback_bid(&id, version, &username)?;
            time::command_envelope("bid.rollback", "ok", serde_json::json!({ "bid": bid }))
        }
        BidCommand::History { id, username } => {
            let history = engine.bid_history(&id, &username)?;
            time::command_envelope(
                "bid.history",
                "ok",
                serde_json::json!({ "bid_id": id, "history": history }),
            )
        }
        BidCommand::Decide {
            id,
            decision,
            username,
        } => {
            let bid = engine.submit_decision(&id, &username, decision)?;
            time::command_envelope("bid.decide", "ok", serde_json::json!({ "bid": bid }))
        }
        BidCommand::CloseCompetitors { id, username } => {
            let closed = engine.close_competitors(&id, &username)?;
            time::command_envelope(
                "bid.close_competitors",
                "ok",
                serde_json::json!({ "bid_id": id, "closed": closed }),
            )
        }
        BidCommand::Feedback { id, text, username } => {
            let entry = engine.submit_feedback(&id, &username, &text)?;
            time::command_envelope("bid.feedback", "ok", serde_json::json!({ "feedback": entry }))
        }
        BidCommand::Reviews {
            tender,
            author,
            username,
            limit,
            offset,
        } => {
            let reviews =
                engine.list_reviews(&tender, &author, &username, engine.page(limit, offset)?)?;
            time::command_envelope("bid.reviews", "ok", serde_json::json!({ "reviews": reviews }))
        }
    };
    Ok(out)
}
