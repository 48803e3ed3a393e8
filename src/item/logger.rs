use std::cell::Cell;

use log::info;
use uuid::Uuid;

use crate::{
    error::BatchError,
    item::payload::OutboundRequest,
    messaging::{ExecutionResponse, MessagingClient},
};

/// A messaging client that only logs requests.
///
/// Used for dry runs: every request is reported as dispatched with status
/// `dry-run` and a fresh sid, and nothing leaves the process.
#[derive(Default)]
pub struct LoggingClient {
    count: Cell<usize>,
}

impl LoggingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests seen so far.
    pub fn count(&self) -> usize {
        self.count.get()
    }
}

impl MessagingClient for LoggingClient {
    fn dispatch(&self, request: &OutboundRequest) -> Result<ExecutionResponse, BatchError> {
        self.count.set(self.count.get() + 1);
        info!("Request:{:?}", request);

        let sid = format!("FN{}", Uuid::new_v4().simple());
        Ok(ExecutionResponse {
            status: "dry-run".to_string(),
            url: format!("dry-run://Flows/{}/Executions/{}", request.flow_id, sid),
            sid,
            contact_channel_address: request.to.clone(),
        })
    }
}
