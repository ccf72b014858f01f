pub mod autopilot;
pub mod constants;
pub mod food;
pub mod input;
pub mod particles;
pub mod runner;
pub mod score;
pub mod session;
pub mod snake;
pub mod types;
pub mod world;
