//! Persistence seam for the enrolment and assessment core.
//!
//! `PostgresStore` is the production backend; `InMemoryStore` backs local runs
//! without `DATABASE_URL` and the test suite.

mod memory;
mod postgres;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use traits::{AttemptStore, CatalogStore, EnrolmentStore, Store, SubmissionTx};
