mod core;
pub mod cors;

pub use core::Middleware;
pub use cors::{
    CorsConfig, CorsConfigError, CorsFlow, CorsMiddleware, CorsMiddlewareBuilder,
    CorsRequestKind,
};
