pub mod approval;
pub mod element;
