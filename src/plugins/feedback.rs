//! Free-text feedback on bids, left by the tender organization.

use crate::core::engine::Engine;
use crate::core::error;
use crate::core::model::{AuthorType, Status};
use crate::core::schemas;
use crate::core::time;
use crate::core::validate::{self, Page};
use crate::plugins::directory;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    pub id: String,
    pub user_id: String,
    pub bid_id: String,
    pub body: String,
    pub created_at: String,
}

fn feedback_from_row(row: &Row<'_>) -> rusqlite::Result<Feedback> {
    Ok(Feedback {
        id: row.get(0)?,
        user_id: row.get(1)?,
        bid_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn initialize_feedback_db(conn: &Connection) -> Result<(), error::TenderError> {
    conn.execute(schemas::FEEDBACK_SCHEMA, [])?;
    conn.execute(schemas::FEEDBACK_INDEX_BID, [])?;
    Ok(())
}

pub(crate) fn feedback_for(conn: &Connection, bid_id: &str) -> Result<Vec<Feedback>, error::TenderError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, bid_id, body, created_at FROM feedback WHERE bid_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![bid_id], feedback_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

impl Engine {
    pub fn submit_feedback(
        &self,
        bid_id: &str,
        username: &str,
        text: &str,
    ) -> Result<Feedback, error::TenderError> {
        validate::id("bid id", bid_id)?;
        validate::feedback(text)?;
        let employee = self.principal(username)?;
        let bid = self.load_bid(bid_id)?;
        let tender = self.load_tender(&bid.tender_id)?;
        self.require_responsible(username, &tender.organization_id, "leave feedback on this bid")?;
        if bid.status == Status::Created {
            return Err(error::TenderError::PreconditionFailed(format!(
                "bid '{}' has not been published",
                bid.id
            )));
        }

        let entry = Feedback {
            id: time::new_id("FB"),
            user_id: employee.id,
            bid_id: bid.id,
            body: text.to_string(),
            created_at: time::now_epoch_z(),
        };
        self.store().with_write("feedback.submit", |conn| {
            conn.execute(
                "INSERT INTO feedback(id, user_id, bid_id, body, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
                params![entry.id, entry.user_id, entry.bid_id, entry.body, entry.created_at],
            )?;
            Ok(())
        })?;
        tracing::info!(bid_id, username, feedback_id = %entry.id, "feedback recorded");
        Ok(entry)
    }

    /// Feedback left on `author`'s personal bids for a tender, oldest first.
    pub fn list_reviews(
        &self,
        tender_id: &str,
        author: &str,
        requester: &str,
        page: Page,
    ) -> Result<Vec<Feedback>, error::TenderError> {
        validate::id("tender id", tender_id)?;
        validate::username(author)?;
        self.principal(requester)?;
        let tender = self.load_tender(tender_id)?;
        self.require_responsible(requester, &tender.organization_id, "read reviews for this tender")?;
        let author_employee = directory::find_employee(self.store(), author)?
            .ok_or_else(|| error::TenderError::NotFound(format!("user '{}' not found", author)))?;

        self.store().with_read("feedback.reviews", |conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.user_id, f.bid_id, f.body, f.created_at
                 FROM feedback f JOIN bid b ON f.bid_id = b.id
                 WHERE b.tender_id = ?1 AND b.author_type = ?2 AND b.author_id = ?3
                 ORDER BY f.rowid LIMIT ?4 OFFSET ?5",
            )?;
            let rows = stmt.query_map(
                params![
                    tender.id,
                    AuthorType::User,
                    author_employee.id,
                    page.limit,
                    page.offset
                ],
                feedback_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}
