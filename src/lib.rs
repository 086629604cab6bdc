pub mod datasets;
pub mod dense;
pub mod embedding;
pub mod error;
pub mod lle;
pub mod metric;
pub mod neighbors;
pub mod sparse;
pub mod weights;
mod utils;

pub use error::{LleError, Result};
pub use lle::{LleFit, RiemannianLLE, RiemannianLLEBuilder};
pub use utils::Direction;
