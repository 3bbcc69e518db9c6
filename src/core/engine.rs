//! The engine handle every tender/bid operation hangs off.
//!
//! Bundles the injected store adapter, the authorization predicate and the
//! loaded configuration. Operations live in `impl Engine` blocks next to their
//! subsystem under `plugins/`.

use crate::core::config::{self, EngineConfig};
use crate::core::error::TenderError;
use crate::core::store::Store;
use crate::core::validate::{self, Page};
use crate::plugins::directory::{self, Directory, Employee, Responsibility};
use std::path::Path;

pub struct Engine {
    store: Store,
    authority: Box<dyn Responsibility>,
    config: EngineConfig,
}

impl Engine {
    /// Open the store at `root`, load its config and answer authorization from
    /// the store's own directory tables.
    pub fn open(root: &Path) -> Result<Self, TenderError> {
        let store = Store::open(root)?;
        let config = config::load_config(root)?;
        let authority = Box::new(Directory::new(store.clone()));
        Ok(Self::new(store, authority, config))
    }

    pub fn new(store: Store, authority: Box<dyn Responsibility>, config: EngineConfig) -> Self {
        Self {
            store,
            authority,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn page(&self, limit: Option<u32>, offset: Option<u32>) -> Result<Page, TenderError> {
        Page::or_default(limit, offset, self.config.default_page_limit)
    }

    /// Resolve a username to a known employee; unknown principals are forbidden.
    pub(crate) fn principal(&self, username: &str) -> Result<Employee, TenderError> {
        validate::username(username)?;
        directory::find_employee(&self.store, username)?
            .ok_or_else(|| TenderError::Forbidden(format!("unknown user '{}'", username)))
    }

    /// Ask the authorization predicate; never cached across calls.
    pub(crate) fn require_responsible(
        &self,
        username: &str,
        organization_id: &str,
        action: &str,
    ) -> Result<(), TenderError> {
        if self.authority.is_responsible(username, organization_id)? {
            return Ok(());
        }
        tracing::info!(username, organization_id, action, "authorization denied");
        Err(TenderError::Forbidden(format!(
            "user '{}' is not responsible for organization '{}' and cannot {}",
            username, organization_id, action
        )))
    }

    pub fn close(self) -> Result<(), TenderError> {
        self.store.close()
    }
}
