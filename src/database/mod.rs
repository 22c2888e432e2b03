pub mod manager;
pub mod query_builder;
pub mod record_store;
pub mod repository;
pub mod schema;
pub mod tenant_store;
pub mod usage_store;

pub use manager::{DatabaseError, DatabaseManager};
pub use record_store::{InsertOutcome, MemoryRecordStore, PgRecordStore, RecordStore};
pub use repository::Repository;
pub use tenant_store::PgTenantStore;
pub use usage_store::PgUsageStore;
