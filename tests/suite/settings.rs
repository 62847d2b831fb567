//! Config file driving a page session.

use std::fs;
use std::time::Duration;

use tempfile::TempDir;
use voxpage_config::SettingsStore;
use voxpage_core::{
    Notifier, PageAgent, PageEdit, PageHandle, Request, Response, Session, SessionConfig,
};
use voxpage_page::{Page, Url};
use voxpage_providers::RemoteClient;
use voxpage_types::{ModelChoice, SettingsPatch, SpeechRate};
use wiremock::MockServer;

use crate::common::{COMPLETIONS_PATH, PAGE_URL, WIDGETS_PAGE, mount_completion, quiet_host};

fn write_config(dir: &TempDir, body: &str) -> SettingsStore {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    SettingsStore::at(path)
}

#[test]
fn patches_keep_unrelated_sections() {
    let dir = TempDir::new().unwrap();
    let store = write_config(
        &dir,
        "# tuned for slow pages\n[page]\nrebuild_debounce_ms = 500\n\n[settings]\nmodel = \"small\"\n",
    );

    let merged = store
        .apply(SettingsPatch {
            speech_rate: Some(SpeechRate::new(1.5)),
            ..SettingsPatch::default()
        })
        .unwrap();

    assert_eq!(merged.model, ModelChoice::Small);
    assert_eq!(merged.speech_rate, SpeechRate::new(1.5));

    let text = fs::read_to_string(store.path()).unwrap();
    assert!(text.contains("# tuned for slow pages"));
    let config = store.load_config().unwrap();
    assert_eq!(config.rebuild_debounce(), Duration::from_millis(500));
    assert_eq!(store.load().unwrap(), merged);
}

#[tokio::test]
async fn configured_endpoint_and_debounce_are_used() {
    let server = MockServer::start().await;
    mount_completion(&server, "Configured.").await;
    let dir = TempDir::new().unwrap();
    let store = write_config(
        &dir,
        &format!(
            "[settings]\napi_key = \"sk-file\"\nmodel = \"small\"\n\n\
             [remote]\nendpoint = \"{}{COMPLETIONS_PATH}\"\n\n\
             [page]\nrebuild_debounce_ms = 100\nhighlight_ms = 100\n",
            server.uri()
        ),
    );
    let config = store.load_config().unwrap();
    let endpoint = config.endpoint().unwrap().to_string();

    let (handle, inbox) = PageHandle::channel(PAGE_URL);
    let session = Session::new(
        Page::parse(WIDGETS_PAGE, Url::parse(PAGE_URL).unwrap()),
        config.resolved_settings(),
        SessionConfig::from_config(&config),
        quiet_host(),
        Notifier::disconnected(),
    );
    let agent = PageAgent::new(session, RemoteClient::for_endpoint(&endpoint), inbox);

    let (session, reply) = tokio::join!(agent.run(), async move {
        handle
            .edit(PageEdit::Remove {
                target: "h2".to_string(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle
            .request(Request::ProcessQuery {
                query: "Who makes these?".to_string(),
            })
            .await
    });

    assert_eq!(
        reply.unwrap(),
        Response::Answer {
            response: "Configured.".to_string()
        }
    );
    assert_eq!(session.index_builds(), 2);
    assert_eq!(session.summary().headings.len(), 2);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        requests[0].headers.get("authorization").unwrap(),
        "Bearer sk-file"
    );
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["model"], "mistral-small-latest");
}
