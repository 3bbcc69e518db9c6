//! Subsystem registration: centralizes all schema initialization functions.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::error;
use crate::plugins::{bid, decision, directory, feedback, tender};
use rusqlite::Connection;

pub(crate) struct SubsystemInit {
    pub name: &'static str,
    pub initialize_db: fn(&Connection) -> Result<(), error::TenderError>,
}

/// Parents before children so foreign keys resolve on first start.
pub(crate) const SUBSYSTEMS: &[SubsystemInit] = &[
    SubsystemInit { name: "directory", initialize_db: directory::initialize_directory_db },
    SubsystemInit { name: "tender", initialize_db: tender::initialize_tender_db },
    SubsystemInit { name: "bid", initialize_db: bid::initialize_bid_db },
    SubsystemInit { name: "decision", initialize_db: decision::initialize_decision_db },
    SubsystemInit { name: "feedback", initialize_db: feedback::initialize_feedback_db },
];

/// Run every initializer inside the caller's write transaction.
pub(crate) fn initialize_all(conn: &Connection) -> Result<(), error::TenderError> {
    for sub in SUBSYSTEMS {
        tracing::trace!(subsystem = sub.name, "initializing schema");
        (sub.initialize_db)(conn)?;
    }
    Ok(())
}
