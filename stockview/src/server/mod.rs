#[allow(clippy::module_inception)]
mod server;

pub use self::server::start_http;
