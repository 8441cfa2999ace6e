pub mod postgres;

pub use postgres::PgListingStore;
