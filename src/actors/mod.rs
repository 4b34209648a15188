pub mod editor;
pub mod supervisor;
