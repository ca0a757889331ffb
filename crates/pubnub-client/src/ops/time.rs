//! Server time query.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::client::ClientRef;
use crate::error::Error;
use crate::request::RequestSpec;
use crate::types::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeResponse {
    pub timetoken: u64,
}

pub struct Time {
    client: Arc<ClientRef>,
}

impl Time {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        Self { client }
    }

    pub async fn execute(self) -> Result<TimeResponse, Error> {
        let mut spec = RequestSpec::new("/time/0".to_string());
        spec.auth_required = false;
        let response = self
            .client
            .execute_json(Operation::Time, Method::GET, spec)
            .await?;
        parse_time_response(&response)
    }
}

/// Wire shape: a single-element array, `[15079041051785708]`.
fn parse_time_response(response: &Value) -> Result<TimeResponse, Error> {
    let timetoken = response
        .as_array()
        .and_then(|entries| entries.first())
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::MalformedResponse("time response is not [timetoken]".into()))?;
    Ok(TimeResponse { timetoken })
}
