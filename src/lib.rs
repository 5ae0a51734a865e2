//! Personal photo, audio and video library.
//!
//! The interesting parts are the boolean [`query`] language, perceptual
//! [`hashing`] with Hamming-ball neighbor search, tag-overlap [`similarity`]
//! and the non-destructive edit pipeline in [`filters`], which compiles an
//! asset's stored operations into a transcoder filter graph for [`export`].

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod filters;
pub mod hashing;
pub mod logging;
pub mod model;
pub mod query;
pub mod scanner;
pub mod similarity;
pub mod tags;
pub mod tasks;
pub mod transcoder;

pub use error::{Error, Result};
pub use model::{Asset, HashRecord, Medium};
