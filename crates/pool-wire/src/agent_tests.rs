use super::*;

struct EchoAgent;

#[async_trait::async_trait]
impl AgentContract for EchoAgent {
    async fn stream(
        &self,
        _conversation_id: &str,
        user_message: &str,
        _context: Value,
    ) -> Result<Vec<AgentEvent>, AgentContractError> {
        Ok(vec![AgentEvent {
            event_type: "message".into(),
            payload: serde_json::json!({ "text": user_message }),
        }])
    }

    async fn health(&self) -> Result<AgentHealth, AgentContractError> {
        Ok(AgentHealth { status: "healthy".into(), details: None })
    }

    async fn shutdown(&self, _graceful: bool, _timeout_seconds: u64) -> Result<(), AgentContractError> {
        Ok(())
    }
}

#[tokio::test]
async fn echo_agent_round_trips_through_the_contract() {
    let agent = EchoAgent;
    let events = agent.stream("conv-1", "hello", serde_json::json!({})).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["text"], "hello");

    let health = agent.health().await.unwrap();
    assert_eq!(health.status, "healthy");

    agent.shutdown(true, 5).await.unwrap();
}
