//! Category mapping store and reconciliation pipeline.
//!
//! `MappingStore` holds what one source view knows: its raw categories, the
//! canonical list, persisted mappings and current suggestions. `Reconciler`
//! drives it against a `CategoryApi`: load canonical + mappings, then
//! suggestions; persist single mappings or bulk auto-map; refetch after every
//! mutation.

mod reconciler;
mod state;

pub use reconciler::{ReconcileConfig, Reconciler};
pub use state::{MappingStore, Progress, RequestTag};

use menuscope_backend_http::BackendError;
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Raw category must not be empty")]
    EmptyRawCategory,

    #[error("No suggestion available for '{0}'")]
    NoSuggestion(String),

    #[error("Another mapping change is still in progress")]
    MutationInFlight,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}
