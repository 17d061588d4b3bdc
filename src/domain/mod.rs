//! Domain types shared by the warehouse, the aggregator and the pipelines.

pub mod documents;
pub mod user;

pub use documents::{Category, Document};
pub use user::{split_user_full_name, UserDocument, UserName};
