//! Request path: rate limiting, admission and dispatch to the wrapped handler.

pub mod analytics_routes;
pub mod gateway;
pub mod handler;
pub mod response;

pub use gateway::{TrafficGate, HEALTH_PATH};
pub use handler::{RequestHandler, UpstreamHandler};
pub use response::{ReqBody, Rejection, RespBody};
