
pub mod fno;
pub mod grid;

pub mod burgers;
pub mod data;
pub mod grf;

pub mod checkpoint;
pub mod loss;
pub mod optim;
pub mod train;

pub mod error;
pub mod fft;
pub mod parameters;
pub mod utils;

pub use error::{Error, Result};
