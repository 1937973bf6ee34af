mod versioned_schema;

pub use versioned_schema::{read_schema_version, Column, SqlType, Table, VersionedSchema};

/// Offset added to schema versions before they are written to `PRAGMA user_version`,
/// so a database created by some other tool (user_version 0) is never mistaken
/// for one of ours.
pub const BASE_DB_VERSION: usize = 1000;
