//! Mock version of the messaging client.
use mockall::mock;

use survey_batch::{
    error::BatchError,
    item::payload::OutboundRequest,
    messaging::{ExecutionResponse, MessagingClient},
};

mock! {
    pub Client {}
    impl MessagingClient for Client {
        fn dispatch(&self, request: &OutboundRequest) -> Result<ExecutionResponse, BatchError>;
    }
}

/// What the provider answers for a started execution.
#[allow(dead_code)]
pub fn accepted(request: &OutboundRequest) -> ExecutionResponse {
    let sid = format!("FN{}", request.to.trim_start_matches('+'));
    ExecutionResponse {
        status: "active".to_string(),
        url: format!("https://studio.example/Flows/{}/Executions/{}", request.flow_id, sid),
        sid,
        contact_channel_address: request.to.clone(),
    }
}
