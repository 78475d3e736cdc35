use std::time::Duration;

use crate::dispatcher::{HandlerRequest, HandlerResponse};

/// Request/response hook run by the [`Dispatcher`](crate::dispatcher::Dispatcher)
///
/// `before` may return a response to short-circuit the request; the route
/// handler is then skipped. `after` runs on every final response.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &HandlerRequest) -> Option<HandlerResponse> {
        None
    }
    fn after(&self, _req: &HandlerRequest, _res: &mut HandlerResponse, _latency: Duration) {}
}
