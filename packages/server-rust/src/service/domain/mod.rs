//! Built-in endpoints served through the dispatch pipeline.

pub mod me;

pub use me::{attach_me_handler, MeHandlerFactory, ME_PATH};
