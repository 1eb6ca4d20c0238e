mod handlers;
mod processor;

pub use handlers::pixel_handler;
pub use processor::record_visit;
