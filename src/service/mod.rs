pub mod http;
pub mod status;

pub use self::http::GatewayHttpApp;
pub use self::status::StatusHttpApp;
