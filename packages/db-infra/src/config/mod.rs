pub mod db;
pub mod properties;

pub use properties::{keys, Properties};
