//! Config validator
//! A `ConfigWalker` that stages checks in memory and flags duplicate ids,
//! reporting success or failure without touching live supervisor state.
//! Reload runs this over the control file before swapping anything in.

use crate::domain::entities::Check;
use crate::domain::ports::ConfigWalker;
use crate::domain::{Error, Result};
use std::collections::HashMap;
use tracing::warn;

#[derive(Default)]
pub struct Validator {
    checks: Vec<Check>,
    settings: HashMap<String, String>,
    success: bool,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            settings: HashMap::new(),
            success: true,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Hands the staged checks over for loading.
    pub fn into_checks(self) -> Vec<Check> {
        self.checks
    }

    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }

    fn find(&self, id: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.id() == id)
    }
}

impl ConfigWalker for Validator {
    fn add_check(&mut self, check: Check) -> Result<()> {
        if self.find(check.id()).is_some() {
            let err = Error::DuplicateCheck(check.id().to_string());
            warn!("{}", err);
            self.success = false;
            return Err(err);
        }
        self.checks.push(check);
        Ok(())
    }

    fn set_namespaced_config(&mut self, _namespace: &str, _attrs: &HashMap<String, String>) {}

    fn set_attribute(&mut self, key: &str, value: &str) {
        self.settings.insert(key.to_string(), value.to_string());
    }
}
