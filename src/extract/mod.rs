pub mod emails;
pub mod phones;
