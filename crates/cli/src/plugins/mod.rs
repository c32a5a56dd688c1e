mod write;

pub use write::WritePlugin;
