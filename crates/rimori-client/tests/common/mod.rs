// Shared test utilities for integration tests
#![allow(dead_code)]

use rimori_client::{ClientConfig, EventBus, RimoriClient};
use serde_json::{json, Value};
use wiremock::MockServer;

pub const PLUGIN_ID: &str = "pl001";

/// A connection context pointing at `url`.
pub fn context_json(url: &str, token: &str) -> Value {
    json!({
        "url": url,
        "key": "anon-key",
        "token": token,
        "expiration": "2099-01-01T00:00:00Z",
        "pluginId": PLUGIN_ID,
        "guild": {"id": "g1", "name": "Porto"},
        "installedPlugins": [{"id": "pl002", "title": "Flashcards"}],
        "profile": {"userId": "u1", "motherTongue": "de"},
        "interfaceLanguage": "de"
    })
}

/// A standalone client whose bus answers access requests with a context
/// aimed at `server`.
pub fn client_for(server: &MockServer) -> (RimoriClient, EventBus) {
    let bus = EventBus::named("TestBus");
    bus.respond(
        "host",
        "global.supabase.requestAccess",
        context_json(&server.uri(), "jwt-1"),
    )
    .expect("register access responder");
    let client =
        RimoriClient::standalone(ClientConfig::new(PLUGIN_ID), bus.clone()).expect("client");
    (client, bus)
}
