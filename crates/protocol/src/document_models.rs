//! Context document models.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A named text blob supplied as background material to a generation call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ContextDocument {
    pub id: String,
    pub name: String,
    /// Full document body.
    #[serde(default)]
    pub content: String,
}
