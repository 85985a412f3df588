pub mod app;
pub mod assets;
pub mod config;
pub mod renderer;
