//! Page context end to end: routing, remote answers, edits.

use std::time::Duration;

use voxpage_core::{PageEdit, RecognitionEvent, Request, Response};
use voxpage_types::{Notification, Settings, Status};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    COMPLETIONS_PATH, EXAMPLE_DOMAIN, Harness, WIDGETS_PAGE, client_for, drain, harness,
    mount_completion, mount_slow_completion, settings_with_key, unreachable_client,
};

fn query(text: &str) -> Request {
    Request::ProcessQuery {
        query: text.to_string(),
    }
}

#[tokio::test]
async fn page_identity_is_answered_locally() {
    let Harness {
        handle,
        agent,
        mut notifications,
        spoken,
        ..
    } = harness(EXAMPLE_DOMAIN, Settings::default(), unreachable_client());

    let (_, reply) = tokio::join!(agent.run(), async move {
        handle.request(query("What is this page about?")).await
    });

    let expected = "This page is about Example Domain. It appears to be a informational page.";
    assert_eq!(
        reply.unwrap(),
        Response::Answer {
            response: expected.to_string()
        }
    );
    assert_eq!(spoken.lines(), vec![expected.to_string()]);
    assert_eq!(
        drain(&mut notifications),
        vec![
            Notification::ContentScriptReady,
            Notification::UpdateStatus {
                status: Status::Processing
            },
            Notification::NewAssistantMessage {
                message: expected.to_string()
            },
        ]
    );
}

#[tokio::test]
async fn remote_answer_is_spoken_and_broadcast() {
    let server = MockServer::start().await;
    mount_completion(&server, "Plans start at five dollars a month.").await;

    let Harness {
        handle,
        agent,
        mut notifications,
        spoken,
        ..
    } = harness(
        WIDGETS_PAGE,
        settings_with_key("sk-live"),
        client_for(&server),
    );

    let (_, reply) = tokio::join!(agent.run(), async move {
        handle.request(query("How much does it cost?")).await
    });

    assert_eq!(
        reply.unwrap(),
        Response::Answer {
            response: "Plans start at five dollars a month.".to_string()
        }
    );
    assert_eq!(spoken.lines(), vec!["Plans start at five dollars a month."]);
    assert!(
        drain(&mut notifications).contains(&Notification::NewAssistantMessage {
            message: "Plans start at five dollars a month.".to_string()
        })
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["model"], "mistral-large-latest");
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.starts_with("I'm on this webpage: \"Acme Widgets\""));
    assert!(user.contains("My question is: \"How much does it cost?\""));
}

#[tokio::test]
async fn voice_answer_outlives_the_last_handle() {
    let server = MockServer::start().await;
    mount_slow_completion(
        &server,
        "Plans start at five dollars a month.",
        Duration::from_millis(200),
    )
    .await;

    let Harness {
        handle,
        agent,
        mut notifications,
        spoken,
        ..
    } = harness(
        WIDGETS_PAGE,
        settings_with_key("sk-live"),
        client_for(&server),
    );

    let (_, ()) = tokio::join!(agent.run(), async move {
        handle.request(Request::StartListening).await.unwrap();
        let link = handle.host_link();
        link.recognition(RecognitionEvent::Transcript(
            "How much does it cost?".to_string(),
        ))
        .unwrap();
        link.recognition(RecognitionEvent::Ended).unwrap();
        drop(handle);
    });

    assert_eq!(spoken.lines(), vec!["Plans start at five dollars a month."]);
    assert!(
        drain(&mut notifications).contains(&Notification::NewAssistantMessage {
            message: "Plans start at five dollars a month.".to_string()
        })
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_key_never_touches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let Harness {
        handle,
        agent,
        mut notifications,
        ..
    } = harness(WIDGETS_PAGE, Settings::default(), client_for(&server));

    let (_, reply) = tokio::join!(agent.run(), async move {
        handle.request(query("How much does it cost?")).await
    });

    assert_eq!(
        reply.unwrap(),
        Response::Answer {
            response: "Please set up your API key in the extension settings.".to_string()
        }
    );
    assert!(!drain(&mut notifications).contains(&Notification::UpdateStatus {
        status: Status::Error
    }));
}

#[tokio::test]
async fn remote_failure_becomes_an_apology() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer sk-bad"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "message": "Unauthorized"
            })),
        )
        .mount(&server)
        .await;

    let Harness {
        handle,
        agent,
        mut notifications,
        spoken,
        ..
    } = harness(WIDGETS_PAGE, settings_with_key("sk-bad"), client_for(&server));

    let (_, reply) = tokio::join!(agent.run(), async move {
        handle.request(query("How much does it cost?")).await
    });

    let Ok(Response::Answer { response }) = reply else {
        panic!("expected an answer, got {reply:?}");
    };
    assert!(response.starts_with("Sorry, I had trouble generating a response: API error (401)"));
    assert!(response.ends_with("Please check the API key and try again."));
    assert_eq!(spoken.lines(), vec![response]);
    assert!(drain(&mut notifications).contains(&Notification::UpdateStatus {
        status: Status::Error
    }));
}

#[tokio::test]
async fn navigation_confirms_and_unknown_targets_apologize() {
    let Harness {
        handle, agent, spoken, ..
    } = harness(WIDGETS_PAGE, Settings::default(), unreachable_client());

    let (_, (found, missing)) = tokio::join!(agent.run(), async move {
        let found = handle.request(query("go to the pricing section")).await;
        let missing = handle.request(query("go to the careers section")).await;
        (found, missing)
    });

    assert_eq!(
        found.unwrap(),
        Response::Answer {
            response: "Navigated to heading \"Pricing\"".to_string()
        }
    );
    assert_eq!(
        missing.unwrap(),
        Response::Answer {
            response: "I couldn't find what you're looking for on this page.".to_string()
        }
    );
    assert_eq!(spoken.lines().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn mutation_burst_rebuilds_the_summary_once_settled() {
    let Harness { handle, agent, .. } =
        harness(WIDGETS_PAGE, Settings::default(), unreachable_client());

    let (session, (before, after)) = tokio::join!(agent.run(), async move {
        for caption in ["Plans", "Add-ons", "Discounts"] {
            handle
                .edit(PageEdit::Append {
                    parent: "article".to_string(),
                    html: format!("<table><caption>{caption}</caption><tr><td>1</td></tr></table>"),
                })
                .await
                .unwrap();
        }
        let before = handle.request(Request::GetPageInfo).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let after = handle.request(Request::GetPageInfo).await.unwrap();
        (before, after)
    });

    let table_count = |response: Response| match response {
        Response::PageInfo { dom_tree, .. } => dom_tree.tables.len(),
        other => panic!("expected page info, got {other:?}"),
    };
    assert_eq!(table_count(before), 0);
    assert_eq!(table_count(after), 3);
    // Initial build plus one debounced rebuild.
    assert_eq!(session.index_builds(), 2);
}
