pub mod dialect;
pub mod postgres;
pub mod sqlite;
pub mod traits;

pub use dialect::*;
pub use postgres::*;
pub use sqlite::*;
pub use traits::*;
