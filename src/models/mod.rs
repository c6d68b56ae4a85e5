pub mod interaction;
pub mod journal;
pub mod mood;
pub mod queue;
pub mod settings;
pub mod subscription;
pub mod trend;
