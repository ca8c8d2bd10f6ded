//! Workload identity: the runtime object name and ownership labels derived
//! from a scheduler name and a selector.
//!
//! Both functions are pure. Discovery goes through the labels; the
//! identifier is only the runtime-side name key.

use std::collections::HashMap;

use crate::types::Selector;

/// Label carrying the name of the scheduler that created an object.
pub const MANAGER_LABEL: &str = "manager";
/// Label carrying the selector's module.
pub const MODULE_LABEL: &str = "module";
/// Label carrying the selector's name.
pub const NAME_LABEL: &str = "name";

/// Runtime object name for `selector` under `scheduler_name`:
/// `<scheduler>-<module>-<name>`.
pub fn identifier(scheduler_name: &str, selector: &Selector) -> String {
    format!("{scheduler_name}-{}-{}", selector.module, selector.name)
}

/// Ownership labels attached to every object the scheduler creates.
pub fn labels(scheduler_name: &str, selector: &Selector) -> HashMap<String, String> {
    HashMap::from([
        (MANAGER_LABEL.to_string(), scheduler_name.to_string()),
        (MODULE_LABEL.to_string(), selector.module.clone()),
        (NAME_LABEL.to_string(), selector.name.clone()),
    ])
}
