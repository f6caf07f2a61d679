use serde::{Deserialize, Serialize};

/// Name of the implicit fetch group lazy basic attributes fall into.
pub const DEFAULT_FETCH_GROUP: &str = "DEFAULT";

/// Global settings that decide how attributes are split between the base
/// fetch group and lazily loaded fetch groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LazyLoadingConfig {
    /// Load collections together with the base state instead of lazily.
    pub collections_in_default_fetch_group: bool,
    /// Allow a lazy to-one association to be represented by an identity-only
    /// surrogate built from its foreign key, keeping it in the base group.
    pub allow_enhancement_as_proxy: bool,
    /// Group name for lazy attributes without an explicit group.
    pub default_fetch_group: String,
}

impl Default for LazyLoadingConfig {
    fn default() -> Self {
        Self {
            collections_in_default_fetch_group: false,
            allow_enhancement_as_proxy: true,
            default_fetch_group: DEFAULT_FETCH_GROUP.to_string(),
        }
    }
}
