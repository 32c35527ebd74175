//! Filesystem collaborators for the Augur pipeline: upload persistence,
//! schema extraction, and secret loading.

pub mod schema;
pub mod secrets;
pub mod uploads;

pub use schema::{collect_schema_hints, csv_headers, sqlite_schema};
pub use secrets::{EnvSecretService, SecretService};
pub use uploads::{resolve_question, save_uploads};
