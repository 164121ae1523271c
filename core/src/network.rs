pub mod neighbors;
pub mod tcp;
