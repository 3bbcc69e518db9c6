//! Centralized database schema definitions.
//!
//! All tables live in one SQLite database (`tenderhub.db`) so that history rows,
//! decisions and feedback can reference their parents with `ON DELETE CASCADE`.
//! 1. Directory: employee, organization, organization_responsible (read by the engine).
//! 2. Tenders: tender, tender_history.
//! 3. Bids: bid, bid_history, user_decision, feedback.

pub const TENDER_DB_NAME: &str = "tenderhub.db";

// --- 1. Directory ---

pub const DIRECTORY_SCHEMA_EMPLOYEE: &str = "
    CREATE TABLE IF NOT EXISTS employee (
        id TEXT PRIMARY KEY,
        username TEXT UNIQUE NOT NULL,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
";
pub const DIRECTORY_SCHEMA_ORGANIZATION: &str = "
    CREATE TABLE IF NOT EXISTS organization (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        org_type TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";
pub const DIRECTORY_SCHEMA_RESPONSIBLE: &str = "
    CREATE TABLE IF NOT EXISTS organization_responsible (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL REFERENCES organization(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES employee(id) ON DELETE CASCADE,
        UNIQUE(organization_id, user_id)
    )
";
pub const DIRECTORY_INDEX_RESPONSIBLE_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_responsible_user ON organization_responsible(user_id)";

// --- 2. Tenders ---

pub const TENDER_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tender (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        service_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'Created',
        organization_id TEXT NOT NULL REFERENCES organization(id) ON DELETE CASCADE,
        creator_id TEXT NOT NULL REFERENCES employee(id) ON DELETE CASCADE,
        version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";
pub const TENDER_SCHEMA_HISTORY: &str = "
    CREATE TABLE IF NOT EXISTS tender_history (
        id TEXT PRIMARY KEY,
        tender_id TEXT NOT NULL REFERENCES tender(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        service_type TEXT NOT NULL,
        version INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(tender_id, version)
    )
";
pub const TENDER_INDEX_SERVICE_TYPE: &str =
    "CREATE INDEX IF NOT EXISTS idx_tender_service_type ON tender(service_type)";
pub const TENDER_INDEX_CREATOR: &str =
    "CREATE INDEX IF NOT EXISTS idx_tender_creator ON tender(creator_id)";

// --- 3. Bids ---

pub const BID_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS bid (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'Created',
        tender_id TEXT NOT NULL REFERENCES tender(id) ON DELETE CASCADE,
        author_type TEXT NOT NULL,
        author_id TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
        coordination TEXT NOT NULL DEFAULT 'Expectation',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";
pub const BID_SCHEMA_HISTORY: &str = "
    CREATE TABLE IF NOT EXISTS bid_history (
        id TEXT PRIMARY KEY,
        bid_id TEXT NOT NULL REFERENCES bid(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        version INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(bid_id, version)
    )
";
pub const BID_INDEX_TENDER: &str = "CREATE INDEX IF NOT EXISTS idx_bid_tender ON bid(tender_id)";
pub const BID_INDEX_AUTHOR: &str =
    "CREATE INDEX IF NOT EXISTS idx_bid_author ON bid(author_type, author_id)";

pub const DECISION_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS user_decision (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES employee(id) ON DELETE CASCADE,
        bid_id TEXT NOT NULL REFERENCES bid(id) ON DELETE CASCADE,
        decision TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(bid_id, user_id)
    )
";

pub const FEEDBACK_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS feedback (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES employee(id) ON DELETE CASCADE,
        bid_id TEXT NOT NULL REFERENCES bid(id) ON DELETE CASCADE,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";
pub const FEEDBACK_INDEX_BID: &str =
    "CREATE INDEX IF NOT EXISTS idx_feedback_bid ON feedback(bid_id)";
