pub mod engine;
pub mod legend;
pub mod loader;
pub mod renderer;
pub mod scene;
pub mod traits;
pub mod transform;
pub mod types;
pub mod video;
