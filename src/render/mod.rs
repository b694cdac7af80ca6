mod core;

pub use self::core::{NullRenderer, Renderer};
