pub mod batch;
pub mod resource;
pub mod streaming;
pub mod validator;
