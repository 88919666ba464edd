pub mod config;
pub mod editor;
pub mod engine;
pub mod export;
pub mod gateway;
pub mod model;
pub mod progress;
pub mod render;
pub mod validation;
pub mod view;
