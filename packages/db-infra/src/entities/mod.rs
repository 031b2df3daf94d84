//! Mapped domain types of the modeler schema.

pub mod model;
pub mod model_history;
pub mod model_relation;

pub use model::Entity as Models;
pub use model::Model;
pub use model_history::Entity as ModelHistories;
pub use model_history::Model as ModelHistory;
pub use model_relation::Entity as ModelRelations;
pub use model_relation::Model as ModelRelation;

/// Tables of every mapped type, parents first.
pub const MAPPED_TABLES: [&str; 3] = [
    "ACT_DE_MODEL",
    "ACT_DE_MODEL_HISTORY",
    "ACT_DE_MODEL_RELATION",
];
