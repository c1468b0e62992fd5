//! Host surface: where rendered frames go once drawn.

pub mod pipe;
