pub mod entity;
pub mod filter;
pub mod join;
pub mod record;
pub mod request;
pub mod schema;

pub use entity::*;
pub use filter::*;
pub use join::*;
pub use record::*;
pub use request::*;
pub use schema::*;
