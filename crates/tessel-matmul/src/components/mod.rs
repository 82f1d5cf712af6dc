pub mod batch;
pub mod global;
pub mod stage;
pub mod tile;

mod config;
mod error;
mod ident;
mod line_size;
mod precision;
mod problem;
mod selection;

pub use config::*;
pub use error::*;
pub use ident::*;
pub use line_size::*;
pub use precision::*;
pub use problem::*;
pub use selection::*;
