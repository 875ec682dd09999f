pub mod dashboard;
pub mod domain;
pub mod error;
pub mod ordering;
pub mod protocol;
pub mod validation;
