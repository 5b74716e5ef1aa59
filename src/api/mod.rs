pub mod filters;
pub mod handlers;
pub mod methods;
pub mod routes;

pub use filters::*;
pub use handlers::*;
pub use methods::*;
pub use routes::*;
