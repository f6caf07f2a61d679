use serde::{Deserialize, Serialize};

/// Who drives transaction boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionModel {
    /// Transactions are begun and completed on the session itself.
    #[default]
    ResourceLocal,
    /// A surrounding coordinator owns the transaction.
    ExternallyManaged,
}

impl TransactionModel {
    pub fn is_externally_managed(self) -> bool {
        self == Self::ExternallyManaged
    }
}

/// When pending changes are written to the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    #[default]
    Auto,
    Commit,
    /// Only on an explicit flush.
    Manual,
}

/// Factory-wide settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFactoryOptions {
    /// Lazy loads may open a temporary session when none is usable.
    pub allow_load_outside_transaction: bool,
    pub transaction_model: TransactionModel,
}

/// Per-session settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Entities loaded by the session default to read-only.
    pub default_read_only: bool,
    pub flush_mode: FlushMode,
}

impl SessionOptions {
    /// Settings of a throwaway session opened to service one lazy load.
    pub fn temporary() -> Self {
        Self {
            default_read_only: true,
            flush_mode: FlushMode::Manual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_defaults_disallow_loading_outside_transaction() {
        let o = SessionFactoryOptions::default();
        assert!(!o.allow_load_outside_transaction);
        assert_eq!(o.transaction_model, TransactionModel::ResourceLocal);
    }

    #[test]
    fn temporary_sessions_are_read_only_manual_flush() {
        let o = SessionOptions::temporary();
        assert!(o.default_read_only);
        assert_eq!(o.flush_mode, FlushMode::Manual);
        assert_ne!(o, SessionOptions::default());
    }
}
