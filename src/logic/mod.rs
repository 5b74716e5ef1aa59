pub mod assembler;
pub mod crud;
pub mod projector;
pub mod shaper;
pub mod validator;

pub use assembler::{AssembledQuery, QueryAssembler, RecordWindow};
pub use crud::Crud;
pub use projector::{project, Owner, ProjectedColumn, Projection};
pub use shaper::{normalize_value, shape};
pub use validator::ResultValidator;
