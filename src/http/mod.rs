mod client;
mod request;

pub(crate) use client::create_client;
pub(crate) use request::execute_request;
