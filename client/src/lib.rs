mod app;
mod dom;
mod net;
mod render;
pub mod session;
pub mod state;
mod ws;

pub use app::run;
