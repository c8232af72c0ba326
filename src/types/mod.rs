//! Common data types

pub mod modes;
pub mod status;
pub mod vector;
pub mod version;

pub use modes::*;
pub use status::*;
pub use vector::*;
pub use version::*;
