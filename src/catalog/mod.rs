mod mem;
mod postgis;
mod reconcile;
mod sqlite;
mod store;
mod types;

pub use mem::MemStore;
pub use postgis::{PostgisStore, GEOMETRY_SRID};
pub use reconcile::{reconcile, ReconcileError, Reconciliation};
pub use sqlite::SqliteStore;
pub use store::CatalogStore;
pub use types::*;
