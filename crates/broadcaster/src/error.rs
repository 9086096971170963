use state::SnapshotError;
use thiserror::Error;

/// Failures that abort a cycle before the snapshot swap.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("rank recompute failed")]
    Recompute(#[source] anyhow::Error),
    #[error("ranking query `{query}` failed")]
    Query {
        query: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("ranking rows do not form a valid snapshot")]
    Snapshot(#[from] SnapshotError),
}

impl BroadcastError {
    pub(crate) fn query(query: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| BroadcastError::Query { query, source }
    }
}
