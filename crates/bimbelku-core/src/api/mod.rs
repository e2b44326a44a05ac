//! REST API access for the BimbelKu backend.
//!
//! Every authenticated call goes through [`RequestGateway`], which attaches
//! the bearer token, renews it once on a 401 and replays the call. The
//! auth endpoints themselves (`endpoints`) are called without that path.

pub mod endpoints;
pub mod error;
pub mod gateway;
pub mod transport;

pub use error::{ApiError, FieldErrors, RenewalError};
pub use gateway::{ApiCall, ApiResponse, Attempt, RequestGateway};
pub use reqwest::Method;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
