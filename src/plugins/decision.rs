//! Decision aggregation: one verdict per (bid, decider), quorum, and the
//! competitor cascade.
//!
//! A single `Rejected` closes the bid at once. `Approved` closes it once the
//! approval count reaches the configured quorum, after which every sibling bid
//! still in `Expectation` is closed as `RejectedByConflict`.
//!
//! The insert, the approval count and the `coordination` flip share one write
//! transaction; the flip is a compare-and-swap from `Expectation`, so two racing
//! approvals can never both close the bid. The cascade runs afterwards, one
//! guarded write per sibling, and can be resumed with [`Engine::close_competitors`].

use crate::core::engine::Engine;
use crate::core::error;
use crate::core::history::Versioned;
use crate::core::lifecycle;
use crate::core::model::{Coordination, Verdict};
use crate::core::schemas;
use crate::core::time;
use crate::core::validate;
use crate::plugins::bid::Bid;
use crate::plugins::tender::Tender;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserDecision {
    pub id: String,
    pub user_id: String,
    pub bid_id: String,
    pub decision: Verdict,
    pub created_at: String,
}

/// Outcome a freshly recorded verdict produces, given the approvals counted so
/// far (including this one). `None` leaves the bid open.
pub fn resolve_outcome(verdict: Verdict, approvals: u32, quorum: u32) -> Option<Coordination> {
    match verdict {
        Verdict::Rejected => Some(Coordination::Rejected),
        Verdict::Approved if approvals >= quorum => Some(Coordination::Approved),
        Verdict::Approved => None,
    }
}

pub fn initialize_decision_db(conn: &Connection) -> Result<(), error::TenderError> {
    conn.execute(schemas::DECISION_SCHEMA, [])?;
    Ok(())
}

pub(crate) fn decisions_for(conn: &Connection, bid_id: &str) -> Result<Vec<UserDecision>, error::TenderError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, bid_id, decision, created_at
         FROM user_decision WHERE bid_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![bid_id], |row| {
        Ok(UserDecision {
            id: row.get(0)?,
            user_id: row.get(1)?,
            bid_id: row.get(2)?,
            decision: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn already_decided(conn: &Connection, bid_id: &str, user_id: &str) -> Result<bool, error::TenderError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM user_decision WHERE bid_id = ?1 AND user_id = ?2)",
        params![bid_id, user_id],
        |row| row.get(0),
    )?)
}

fn duplicate(bid_id: &str, username: &str) -> error::TenderError {
    error::TenderError::Conflict(format!(
        "user '{}' already decided on bid '{}'",
        username, bid_id
    ))
}

fn count_approvals(conn: &Connection, bid_id: &str) -> Result<u32, error::TenderError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM user_decision WHERE bid_id = ?1 AND decision = 'Approved'",
        params![bid_id],
        |row| row.get(0),
    )?)
}

/// Re-check, record and resolve inside one write transaction.
fn record(
    conn: &Connection,
    bid_id: &str,
    user_id: &str,
    username: &str,
    verdict: Verdict,
    quorum: u32,
) -> Result<Option<Coordination>, error::TenderError> {
    if already_decided(conn, bid_id, user_id)? {
        return Err(duplicate(bid_id, username));
    }
    let bid = Bid::load(conn, bid_id)?;
    let tender = Tender::load(conn, &bid.tender_id)?;
    lifecycle::require_published("bid", &bid.id, bid.status)?;
    lifecycle::require_published("tender", &tender.id, tender.status)?;

    let now = time::now_epoch_z();
    conn.execute(
        "INSERT INTO user_decision(id, user_id, bid_id, decision, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![time::new_id("UD"), user_id, bid_id, verdict, now],
    )
    .map_err(|e| {
        let e = error::TenderError::from(e);
        if e.is_constraint_violation() {
            duplicate(bid_id, username)
        } else {
            e
        }
    })?;

    let outcome = resolve_outcome(verdict, count_approvals(conn, bid_id)?, quorum);
    if let Some(coordination) = outcome {
        let flipped = conn.execute(
            "UPDATE bid SET coordination = ?1, status = ?2, updated_at = ?3
             WHERE id = ?4 AND coordination = 'Expectation'",
            params![
                coordination,
                lifecycle::status_for(coordination),
                now,
                bid_id
            ],
        )?;
        if flipped == 0 {
            return Err(error::TenderError::StaleWrite(format!(
                "bid '{}' left Expectation concurrently",
                bid_id
            )));
        }
    }
    Ok(outcome)
}

impl Engine {
    /// Record `username`'s verdict on a bid and apply any terminal outcome.
    pub fn submit_decision(
        &self,
        bid_id: &str,
        username: &str,
        verdict: Verdict,
    ) -> Result<Bid, error::TenderError> {
        validate::id("bid id", bid_id)?;
        let employee = self.principal(username)?;
        let bid = self.load_bid(bid_id)?;
        let tender = self.load_tender(&bid.tender_id)?;
        self.require_responsible(username, &tender.organization_id, "decide on bids for this tender")?;
        // A repeat is a conflict even once the bid has closed.
        if bid.decisions.iter().any(|d| d.user_id == employee.id) {
            return Err(duplicate(bid_id, username));
        }
        lifecycle::require_published("bid", &bid.id, bid.status)?;
        lifecycle::require_published("tender", &tender.id, tender.status)?;

        let quorum = self.config().quorum;
        let outcome = self.store().with_write_retry(
            "decision.submit",
            self.config().decision_attempts,
            |conn| record(conn, bid_id, &employee.id, username, verdict, quorum),
        )?;
        tracing::info!(bid_id, username, verdict = %verdict, "decision recorded");

        if let Some(coordination) = outcome {
            tracing::info!(bid_id, coordination = %coordination, "bid closed");
            if coordination == Coordination::Approved {
                self.cascade(&tender.id, bid_id)?;
            }
        }
        self.load_bid(bid_id)
    }

    /// Close every sibling of an approved bid that is still in `Expectation`.
    /// Safe to repeat; returns the ids closed by this call.
    pub fn close_competitors(&self, bid_id: &str, username: &str) -> Result<Vec<String>, error::TenderError> {
        validate::id("bid id", bid_id)?;
        self.principal(username)?;
        let bid = self.load_bid(bid_id)?;
        let tender = self.load_tender(&bid.tender_id)?;
        self.require_responsible(username, &tender.organization_id, "close competing bids")?;
        if bid.coordination != Coordination::Approved {
            return Err(error::TenderError::PreconditionFailed(format!(
                "bid '{}' is {}, not Approved",
                bid.id, bid.coordination
            )));
        }
        self.cascade(&tender.id, bid_id)
    }

    fn cascade(&self, tender_id: &str, winner_id: &str) -> Result<Vec<String>, error::TenderError> {
        let open: Vec<String> = self.store().with_read("decision.cascade_scan", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM bid
                 WHERE tender_id = ?1 AND id != ?2 AND coordination = 'Expectation'
                 ORDER BY rowid",
            )?;
            let ids = stmt.query_map(params![tender_id, winner_id], |row| row.get(0))?;
            Ok(ids.collect::<Result<Vec<String>, _>>()?)
        })?;

        let mut closed = Vec::new();
        for (i, sibling) in open.iter().enumerate() {
            let result = self.store().with_write("decision.cascade", |conn| {
                Ok(conn.execute(
                    "UPDATE bid SET coordination = ?1, status = ?2, updated_at = ?3
                     WHERE id = ?4 AND coordination = 'Expectation'",
                    params![
                        Coordination::RejectedByConflict,
                        lifecycle::status_for(Coordination::RejectedByConflict),
                        time::now_epoch_z(),
                        sibling
                    ],
                )?)
            });
            match result {
                Ok(0) => {}
                Ok(_) => {
                    tracing::info!(bid_id = %sibling, winner_id, "competitor closed");
                    closed.push(sibling.clone());
                }
                Err(e) => {
                    let remaining = open[i..].join(", ");
                    tracing::warn!(winner_id, remaining = %remaining, error = %e, "cascade interrupted");
                    return Err(error::TenderError::StorageError(format!(
                        "closing competitors of bid '{}' stopped; still open: {}; cause: {}",
                        winner_id,
                        remaining,
                        e.reason()
                    )));
                }
            }
        }
        Ok(closed)
    }
}
