//! Server-side conversation sessions

use crate::dialogue::assistant::AssistantState;
use crate::dialogue::order::{format_brl, OrderState};
use crate::error::AgentError;
use crate::models::Stage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    #[default]
    Assistant,
    Order,
}

impl FromStr for FlowKind {
    type Err = AgentError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "assistant" | "techadvisor" => Ok(FlowKind::Assistant),
            "order" | "pedidos" | "delivery" => Ok(FlowKind::Order),
            other => Err(AgentError::Config(format!("unknown flow '{}'", other))),
        }
    }
}

/// One conversation in either flow
#[derive(Debug, Clone)]
pub enum Session {
    Assistant(AssistantState),
    Order(OrderState),
}

impl Session {
    pub fn new(kind: FlowKind) -> Self {
        match kind {
            FlowKind::Assistant => Session::Assistant(AssistantState::new()),
            FlowKind::Order => Session::Order(OrderState::new()),
        }
    }

    pub fn kind(&self) -> FlowKind {
        match self {
            Session::Assistant(_) => FlowKind::Assistant,
            Session::Order(_) => FlowKind::Order,
        }
    }

    pub fn terminated(&self) -> bool {
        match self {
            Session::Assistant(state) => state.terminated,
            Session::Order(state) => state.terminated,
        }
    }

    pub fn last_response(&self) -> &str {
        match self {
            Session::Assistant(state) => &state.last_response,
            Session::Order(state) => &state.last_response,
        }
    }

    /// Serializable view of the session after a turn
    pub fn reply(&self) -> TurnReply {
        match self {
            Session::Assistant(state) => TurnReply {
                conversation_id: state.conversation_id,
                flow: FlowKind::Assistant,
                stage: state.stage.tag(),
                user_name: state.user_name.clone(),
                response: state.last_response.clone(),
                terminated: state.terminated,
                cart: None,
            },
            Session::Order(state) => TurnReply {
                conversation_id: state.conversation_id,
                flow: FlowKind::Order,
                stage: state.stage.tag(),
                user_name: state.user_name.clone(),
                response: state.last_response.clone(),
                terminated: state.terminated,
                cart: Some(CartView {
                    items: state.data.summary(),
                    total: format_brl(state.data.total_cents()),
                }),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub conversation_id: Uuid,
    pub flow: FlowKind,
    pub stage: &'static str,
    pub user_name: Option<String>,
    pub response: String,
    pub terminated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart: Option<CartView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: String,
    pub total: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_kind_parsing() {
        assert_eq!("".parse::<FlowKind>().unwrap(), FlowKind::Assistant);
        assert_eq!(" Pedidos ".parse::<FlowKind>().unwrap(), FlowKind::Order);
        assert!("weather".parse::<FlowKind>().is_err());
    }

    #[test]
    fn test_new_session_reply() {
        let reply = Session::new(FlowKind::Order).reply();
        assert_eq!(reply.stage, "boas_vindas");
        assert!(!reply.terminated);
        assert_eq!(reply.cart.map(|c| c.total), Some("R$ 0,00".to_string()));
    }
}
