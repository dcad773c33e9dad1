//! Score aggregation, signature inference, candidate matching, and cause
//! classification over loaded feature rows.

pub mod aggregate;
pub mod cause;
pub mod matcher;
pub mod ngram;
pub mod signature;
