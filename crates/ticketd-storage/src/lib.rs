// PostgreSQL access helper for ticketd handlers
//
// Each handler owns its own Database instance - no pooling or sharing
// across workers. Liveness is verified lazily: every command checks the
// connection first and reconnects if it has gone away.

mod database;

pub use database::{Database, StorageError};
