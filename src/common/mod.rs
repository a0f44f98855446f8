//! 共通の抽象化レイヤーとトレイト定義

mod encodable;
pub mod http;
pub mod request;
pub mod response;
pub mod traits;
pub mod utils;

pub use http::{canonical_header_key, header_lookup_key, reason_phrase, Method};
pub use request::{Request, RequestBuilder, UploadedFile};
pub use response::Response;
pub use traits::{handler_fn, middleware_fn, FnHandler, FnMiddleware, Handler, Middleware, Next, RouteParams};
pub use utils::{escape_html, get_max_body_size, parse_query_string, percent_decode};
