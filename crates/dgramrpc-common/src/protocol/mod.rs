pub mod error;
pub mod params;
pub mod requests;
pub mod responses;


pub use error::{ParamError, Result, RpcError};
pub use params::{Params, Value};
pub use requests::{CorrelationId, MethodName, Request};
pub use responses::{Response, RpcResult, Status};
