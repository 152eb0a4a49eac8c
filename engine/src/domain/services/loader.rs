//! Config loader
//! A `ConfigWalker` that attaches parsed checks directly to the live
//! supervisor. Used at startup; reload goes through the validator first.

use crate::domain::entities::Check;
use crate::domain::ports::ConfigWalker;
use crate::domain::services::Supervisor;
use crate::domain::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

pub struct Loader<'a> {
    supervisor: &'a Supervisor,
}

impl<'a> Loader<'a> {
    pub fn new(supervisor: &'a Supervisor) -> Self {
        Self { supervisor }
    }
}

impl ConfigWalker for Loader<'_> {
    fn add_check(&mut self, check: Check) -> Result<()> {
        self.supervisor.add_check(check)
    }

    fn set_namespaced_config(&mut self, namespace: &str, attrs: &HashMap<String, String>) {
        if namespace != "httpd" {
            debug!(namespace, "Namespace not supported");
            return;
        }
        for (key, value) in attrs {
            match key.as_str() {
                "unixsocket" => self.supervisor.set_socket_file(PathBuf::from(value)),
                other => debug!(namespace, attribute = other, "Ignoring httpd attribute"),
            }
        }
    }

    fn set_attribute(&mut self, key: &str, value: &str) {
        debug!(key, value, "Ignoring attempt to set attribute");
    }
}
