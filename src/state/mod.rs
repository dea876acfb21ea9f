pub mod policy_table;
pub mod price_cache;

pub use policy_table::PolicyTable;
pub use price_cache::PriceCache;
