//! Config walker port
//! The parser is consumer-agnostic: it emits parsed directives to whichever
//! walker it is handed. The loader attaches checks to the live supervisor;
//! the validator stages them without touching live state.

use crate::domain::entities::Check;
use crate::domain::Result;
use std::collections::HashMap;

pub trait ConfigWalker {
    /// Offers a fully parsed check. Implementations reject duplicates.
    fn add_check(&mut self, check: Check) -> Result<()>;

    /// Settings grouped under a recognised `set <namespace> ...` directive.
    fn set_namespaced_config(&mut self, namespace: &str, attrs: &HashMap<String, String>);

    /// A plain `set <name> <value>` directive.
    fn set_attribute(&mut self, key: &str, value: &str);
}
