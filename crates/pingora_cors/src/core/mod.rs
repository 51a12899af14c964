pub mod path_expr;
pub mod request;
pub mod response;
pub mod router;
pub mod service;

pub use http::Method;
pub use path_expr::PathExpression;
pub use request::Request;
pub use response::Response;
pub use router::{Handler, ResultClosure, RouteTable, Router};
pub use service::{Route, WebService};
