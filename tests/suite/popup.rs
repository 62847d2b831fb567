//! Popup against a live page agent.

use tempfile::TempDir;
use voxpage_config::SettingsStore;
use voxpage_core::{Connection, PageHandle, PopupState, Request, Response, run_command};
use voxpage_types::{ModelChoice, Role, Settings, Status};
use wiremock::MockServer;

use crate::common::{
    EXAMPLE_DOMAIN, Harness, PAGE_URL, client_for, harness, mount_completion, settings_with_key,
    unreachable_client,
};

fn texts(popup: &PopupState<PageHandle>) -> Vec<String> {
    popup
        .conversation()
        .entries()
        .iter()
        .map(|entry| entry.text.clone())
        .collect()
}

#[tokio::test]
async fn connect_loads_page_info_and_tests_the_key() {
    let server = MockServer::start().await;
    mount_completion(&server, "Hello!").await;
    let dir = TempDir::new().unwrap();
    let store = SettingsStore::at(dir.path().join("config.toml"));

    let Harness {
        handle,
        agent,
        spoken,
        ..
    } = harness(EXAMPLE_DOMAIN, settings_with_key("sk-live"), client_for(&server));

    // The popup owns a handle; it must be gone before the agent can stop.
    let (_, (connection, conversation)) = tokio::join!(agent.run(), async move {
        let mut popup = PopupState::new(handle, store);
        popup.connect().await;
        popup.test_api().await;
        (popup.connection().clone(), texts(&popup))
    });

    assert_eq!(connection, Connection::Connected);
    assert_eq!(
        conversation,
        vec![
            "Currently on: Example Domain",
            "Testing API connection...",
            "API connection successful!",
        ]
    );
    assert_eq!(spoken.lines(), vec!["API connection successful"]);

    let checks = server.received_requests().await.unwrap();
    let body: serde_json::Value = checks[0].body_json().unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "model": "mistral-small-latest",
            "messages": [{"role": "user", "content": "Say hello briefly"}]
        })
    );
}

#[tokio::test(start_paused = true)]
async fn unreachable_page_ends_in_a_persistent_error() {
    let (handle, inbox) = PageHandle::channel(PAGE_URL);
    drop(inbox);
    let dir = TempDir::new().unwrap();
    let mut popup = PopupState::new(handle, SettingsStore::at(dir.path().join("config.toml")));

    popup.connect().await;

    assert_eq!(
        popup.connection(),
        &Connection::Failed(
            "Could not connect to page. Try refreshing the page and reopening the extension."
                .to_string()
        )
    );
    assert_eq!(popup.status(), Status::Error);
    assert_eq!(popup.conversation().len(), 1);
    assert_eq!(popup.conversation().entries()[0].role, Role::System);
}

#[tokio::test]
async fn settings_saved_in_the_popup_reach_the_page() {
    let server = MockServer::start().await;
    mount_completion(&server, "Sure.").await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let store = SettingsStore::at(&path);

    let Harness { handle, agent, .. } =
        harness(EXAMPLE_DOMAIN, Settings::default(), client_for(&server));

    let (session, reply) = tokio::join!(agent.run(), async move {
        let mut popup = PopupState::new(handle.clone(), store);
        popup.connect().await;
        popup.save_api_key("  sk-fresh ").await.unwrap();
        popup.save_model(ModelChoice::Small).await.unwrap();
        handle
            .request(Request::ProcessQuery {
                query: "Who maintains this domain?".to_string(),
            })
            .await
    });

    assert_eq!(
        reply.unwrap(),
        Response::Answer {
            response: "Sure.".to_string()
        }
    );
    assert_eq!(session.settings().api_key.as_str(), "sk-fresh");
    assert_eq!(session.settings().model, ModelChoice::Small);

    let stored = SettingsStore::at(&path).load().unwrap();
    assert_eq!(stored.api_key.as_str(), "sk-fresh");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["model"], "mistral-small-latest");
}

#[tokio::test]
async fn named_commands_reach_the_page() {
    let Harness {
        handle,
        agent,
        recognizer,
        ..
    } = harness(EXAMPLE_DOMAIN, Settings::default(), unreachable_client());

    let (session, ()) = tokio::join!(agent.run(), async move {
        run_command(&handle, "toggle_voice_input").await;
        run_command(&handle, "stop_speech").await;
        run_command(&handle, "no_such_command").await;
    });

    assert_eq!(recognizer.starts(), 1);
    // Listening only begins once the recognizer reports Started.
    assert!(!session.is_listening());
}
