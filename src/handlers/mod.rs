pub mod health;
pub mod journals;
pub mod moods;
pub mod notifications;
pub mod proxy;
pub mod push;
pub mod settings;
pub mod sync;
pub mod trends;
pub mod ws;
