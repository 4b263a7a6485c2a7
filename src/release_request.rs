use std::sync::Arc;

/// A final release whose local bookkeeping is done, waiting for the compare-and-delete in the store.
#[derive(Debug, Clone)]
pub(crate) struct ReleaseRequest {
    pub(crate) key:   Arc<String>,
    pub(crate) token: Arc<String>,
}
