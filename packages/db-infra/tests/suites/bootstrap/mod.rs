mod external;
mod failures;
mod pooled;
