pub mod javascript;
pub mod screenshot;
