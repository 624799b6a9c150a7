//! Idempotent reconciliation on top of the four capability primitives.
//!
//! Each resource is either Absent or Present. `ensure` moves Absent to
//! Present, `ensure_deleted` moves Present to Absent, and both report a no-op
//! when the resource is already in the requested state. `ensure_cleared`
//! empties a collection without touching its parent.

use tracing::info;

use super::Resource;
use crate::error::{GatewayError, Result};

/// Reconciler wrapping any [`Resource`].
pub struct Lifecycle<'a, R: Resource + ?Sized> {
    resource: &'a R,
}

impl<'a, R: Resource + ?Sized> Lifecycle<'a, R> {
    pub fn new(resource: &'a R) -> Self {
        Self { resource }
    }

    /// Whether the resource's id is in its live listing.
    pub fn exists(&self) -> Result<bool> {
        let id = self.resource.id();
        let list = self.resource.list()?;
        Ok(list.contains(&id))
    }

    /// Create the resource unless present. Returns whether it was created.
    pub fn ensure(&self) -> Result<bool> {
        if self.exists().map_err(|e| self.wrap(e))? {
            return Ok(false);
        }
        self.resource.create().map_err(|e| self.wrap(e))?;
        info!(resource = %self.resource, "created");
        Ok(true)
    }

    /// Delete the resource if present. Returns whether it was deleted.
    pub fn ensure_deleted(&self) -> Result<bool> {
        if !self.exists().map_err(|e| self.wrap(e))? {
            return Ok(false);
        }
        self.resource.delete().map_err(|e| self.wrap(e))?;
        info!(resource = %self.resource, "deleted");
        Ok(true)
    }

    /// Clear the collection unless it is already empty. Returns whether
    /// anything was cleared.
    pub fn ensure_cleared(&self) -> Result<bool> {
        if self.resource.list().map_err(|e| self.wrap(e))?.is_empty() {
            return Ok(false);
        }
        self.resource.clear().map_err(|e| self.wrap(e))?;
        info!(resource = %self.resource, "cleared");
        Ok(true)
    }

    /// `ensure`, plus bringing an already present resource in line with its
    /// descriptor. Returns whether the resource was newly created.
    pub fn upsert(&self) -> Result<bool> {
        if self.ensure()? {
            return Ok(true);
        }
        if self.resource.refresh().map_err(|e| self.wrap(e))? {
            info!(resource = %self.resource, "refreshed");
        }
        Ok(false)
    }

    fn wrap(&self, err: GatewayError) -> GatewayError {
        err.within(self.resource.to_string())
    }
}
