//! Employee and organization directory.
//!
//! These tables belong to the surrounding system; the engine only reads them to
//! resolve principals and to answer [`Responsibility`]. The write helpers here
//! exist to seed a store from the CLI and from tests.

use crate::core::error;
use crate::core::model::OrganizationType;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::core::validate;
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

/// Authorization predicate: may `username` act on behalf of `organization_id`?
///
/// Implementations must be side-effect free. The engine calls this on every
/// authorization-sensitive operation and never caches the answer.
pub trait Responsibility: Send + Sync {
    fn is_responsible(
        &self,
        username: &str,
        organization_id: &str,
    ) -> Result<bool, error::TenderError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Employee {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub description: String,
    pub org_type: OrganizationType,
    pub created_at: String,
}

/// [`Responsibility`] answered from the store's `organization_responsible` table.
#[derive(Debug, Clone)]
pub struct Directory {
    store: Store,
}

impl Directory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl Responsibility for Directory {
    fn is_responsible(
        &self,
        username: &str,
        organization_id: &str,
    ) -> Result<bool, error::TenderError> {
        self.store.with_read("directory.is_responsible", |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS (
                    SELECT 1
                    FROM organization_responsible r
                    JOIN employee e ON r.user_id = e.id
                    WHERE e.username = ?1 AND r.organization_id = ?2
                )",
                params![username, organization_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }
}

pub fn initialize_directory_db(conn: &Connection) -> Result<(), error::TenderError> {
    conn.execute(schemas::DIRECTORY_SCHEMA_EMPLOYEE, [])?;
    conn.execute(schemas::DIRECTORY_SCHEMA_ORGANIZATION, [])?;
    conn.execute(schemas::DIRECTORY_SCHEMA_RESPONSIBLE, [])?;
    conn.execute(schemas::DIRECTORY_INDEX_RESPONSIBLE_USER, [])?;
    Ok(())
}

pub fn add_employee(
    store: &Store,
    username: &str,
    first_name: &str,
    last_name: &str,
) -> Result<Employee, error::TenderError> {
    validate::username(username)?;
    let employee = Employee {
        id: time::new_id("EM"),
        username: username.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        created_at: time::now_epoch_z(),
    };
    store
        .with_write("directory.add_employee", |conn| {
            conn.execute(
                "INSERT INTO employee(id, username, first_name, last_name, created_at)
                 VALUES(?1, ?2, ?3, ?4, ?5)",
                params![
                    employee.id,
                    employee.username,
                    employee.first_name,
                    employee.last_name,
                    employee.created_at
                ],
            )?;
            Ok(())
        })
        .map_err(|e| {
            if e.is_constraint_violation() {
                error::TenderError::Conflict(format!("username '{}' is taken", username))
            } else {
                e
            }
        })?;
    Ok(employee)
}

pub fn add_organization(
    store: &Store,
    name: &str,
    description: &str,
    org_type: OrganizationType,
) -> Result<Organization, error::TenderError> {
    validate::name("organization name", name)?;
    let organization = Organization {
        id: time::new_id("OR"),
        name: name.to_string(),
        description: description.to_string(),
        org_type,
        created_at: time::now_epoch_z(),
    };
    store.with_write("directory.add_organization", |conn| {
        conn.execute(
            "INSERT INTO organization(id, name, description, org_type, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5)",
            params![
                organization.id,
                organization.name,
                organization.description,
                organization.org_type,
                organization.created_at
            ],
        )?;
        Ok(())
    })?;
    Ok(organization)
}

/// Make `username` responsible for `organization_id`. Granting twice is a no-op.
pub fn assign_responsible(
    store: &Store,
    organization_id: &str,
    username: &str,
) -> Result<(), error::TenderError> {
    store.with_write("directory.assign_responsible", |conn| {
        let employee = employee_by_username(conn, username)?.ok_or_else(|| {
            error::TenderError::NotFound(format!("user '{}' not found", username))
        })?;
        if !organization_exists(conn, organization_id)? {
            return Err(error::TenderError::NotFound(format!(
                "organization '{}' not found",
                organization_id
            )));
        }
        conn.execute(
            "INSERT OR IGNORE INTO organization_responsible(id, organization_id, user_id)
             VALUES(?1, ?2, ?3)",
            params![time::new_id("RS"), organization_id, employee.id],
        )?;
        Ok(())
    })
}

pub fn find_employee(store: &Store, username: &str) -> Result<Option<Employee>, error::TenderError> {
    store.with_read("directory.find_employee", |conn| employee_by_username(conn, username))
}

pub(crate) fn employee_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<Employee>, error::TenderError> {
    let employee = conn
        .query_row(
            "SELECT id, username, first_name, last_name, created_at FROM employee WHERE username = ?1",
            params![username],
            |row| {
                Ok(Employee {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    first_name: row.get(2)?,
                    last_name: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(employee)
}

pub(crate) fn organization_exists(
    conn: &Connection,
    organization_id: &str,
) -> Result<bool, error::TenderError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM organization WHERE id = ?1)",
        params![organization_id],
        |row| row.get(0),
    )?)
}

pub(crate) fn employee_exists(conn: &Connection, employee_id: &str) -> Result<bool, error::TenderError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM employee WHERE id = ?1)",
        params![employee_id],
        |row| row.get(0),
    )?)
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "directory", about = "Seed employees, organizations and responsibilities.")]
pub struct DirectoryCli {
    #[clap(subcommand)]
    pub command: DirectoryCommand,
}

#[derive(Subcommand, Debug)]
pub enum DirectoryCommand {
    /// Register an employee.
    AddEmployee {
        #[clap(long)]
        username: String,
        #[clap(long, default_value = "")]
        first_name: String,
        #[clap(long, default_value = "")]
        last_name: String,
    },
    /// Register an organization.
    AddOrganization {
        #[clap(long)]
        name: String,
        #[clap(long, default_value = "")]
        description: String,
        /// IE, LLC or JSC.
        #[clap(long, default_value = "LLC")]
        org_type: OrganizationType,
    },
    /// Make an employee responsible for an organization.
    Grant {
        #[clap(long)]
        organization: String,
        #[clap(long)]
        username: String,
    },
}

pub fn run_directory_cli(
    store: &Store,
    cli: DirectoryCli,
) -> Result<serde_json::Value, error::TenderError> {
    let out = match cli.command {
        DirectoryCommand::AddEmployee {
            username,
            first_name,
            last_name,
        } => {
            let employee = add_employee(store, &username, &first_name, &last_name)?;
            time::command_envelope(
                "directory.add_employee",
                "ok",
                serde_json::json!({ "employee": employee }),
            )
        }
        DirectoryCommand::AddOrganization {
            name,
            description,
            org_type,
        } => {
            let organization = add_organization(store, &name, &description, org_type)?;
            time::command_envelope(
                "directory.add_organization",
                "ok",
                serde_json::json!({ "organization": organization }),
            )
        }
        DirectoryCommand::Grant {
            organization,
            username,
        } => {
            assign_responsible(store, &organization, &username)?;
            time::command_envelope(
                "directory.grant",
                "ok",
                serde_json::json!({ "organization_id": organization, "username": username }),
            )
        }
    };
    Ok(out)
}
