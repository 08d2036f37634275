//! Query routing agent
//!
//! Asks the chat model for a one-word classification. Anything other than a
//! clean `SUMMARY` or `NEEDLE`, including a failed call, routes to the needle
//! agent.

use crate::prompts::ROUTER_SYSTEM_PROMPT;
use claimrag_common::document::Route;
use claimrag_common::llm::{ChatModel, ChatRequest};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

const ROUTER_MAX_TOKENS: u32 = 10;

/// Map a classifier reply to a route
pub fn parse_route(reply: &str) -> Option<Route> {
    match reply.trim().to_ascii_uppercase().as_str() {
        "SUMMARY" => Some(Route::Summary),
        "NEEDLE" => Some(Route::Needle),
        _ => None,
    }
}

pub struct RoutingAgent {
    chat: Arc<dyn ChatModel>,
}

impl RoutingAgent {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    #[instrument(skip(self))]
    pub async fn route(&self, query: &str) -> Route {
        let request = ChatRequest::new(query)
            .system(ROUTER_SYSTEM_PROMPT)
            .temperature(0.0)
            .max_tokens(ROUTER_MAX_TOKENS);

        match self.chat.complete(&request).await {
            Ok(reply) => match parse_route(&reply) {
                Some(route) => {
                    info!(route = %route, "Query routed");
                    route
                }
                None => {
                    warn!(reply = %reply, "Unexpected routing decision, defaulting to needle");
                    Route::Needle
                }
            },
            Err(e) => {
                error!(error = %e, "Routing failed, defaulting to needle");
                Route::Needle
            }
        }
    }
}
