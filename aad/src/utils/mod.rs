pub mod errors;
pub mod num;
