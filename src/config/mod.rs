pub mod settings;
pub mod symbol;
