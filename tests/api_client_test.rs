use diacare_admin::editor::{DialogState, EditorError};
use diacare_admin::engine::Thresholds;
use diacare_admin::gateway::{ApiClient, Gateway, GatewayError};
use diacare_admin::model::{
    FollowEventFlow, OnboardingStep, RecommendationDraft, RiskLevel, StepType,
};
use diacare_admin::view::{FlowsView, PatientsView, SettingsView};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Request as seen by the one-shot server.
#[derive(Debug)]
struct Captured {
    head: String,
    body: String,
}

impl Captured {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

/// Serve one HTTP exchange per canned `(status, body)`, in order, on an
/// ephemeral port. Each response closes its connection.
async fn serve(responses: Vec<(&str, &str)>) -> (String, JoinHandle<Vec<Captured>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let responses: Vec<String> = responses
        .into_iter()
        .map(|(status, body)| {
            format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
        })
        .collect();
    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            let head_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos;
                }
                assert!(n > 0, "connection closed before headers");
            };
            let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
            let length = head
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            while raw.len() < head_end + 4 + length {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let body = String::from_utf8_lossy(&raw[head_end + 4..]).to_string();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            captured.push(Captured { head, body });
        }
        captured
    });
    (format!("http://{}/api", addr), handle)
}

async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<Captured>) {
    let (base, all) = serve(vec![(status, body)]).await;
    let handle = tokio::spawn(async move { all.await.unwrap().remove(0) });
    (base, handle)
}

fn client(base: &str) -> ApiClient {
    ApiClient::new(base, "admin-token".into(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn patients_are_unwrapped_from_data_envelope() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"data":[{"line_user_id":"U1","display_name":"Somchai","a1c_estimate":7.2,"total_readings":5},{"line_user_id":"U2"}]}"#,
    )
    .await;

    let patients = client(&base).get_all_patients().await;
    let captured = server.await.unwrap();

    assert_eq!(captured.request_line(), "GET /api/patients HTTP/1.1");
    assert_eq!(captured.header("authorization"), Some("Bearer admin-token"));
    let patients = patients.unwrap();
    assert_eq!(patients.len(), 2);
    assert_eq!(patients[0].display_name, "Somchai");
    assert_eq!(patients[1].total_readings, 0);
}

#[tokio::test]
async fn server_error_carries_backend_message() {
    let (base, server) = serve_once("404 Not Found", r#"{"detail":"Patient not found"}"#).await;

    let err = client(&base).get_patient_stats("U 404").await.unwrap_err();
    let captured = server.await.unwrap();

    assert_eq!(captured.request_line(), "GET /api/patients/U404/stats HTTP/1.1");
    match &err {
        GatewayError::Server { status, message } => {
            assert_eq!(*status, 404);
            assert_eq!(message, "Patient not found");
        }
        other => panic!("expected server error, got {:?}", other),
    }
    assert_eq!(err.server_message(), Some("Patient not found"));
}

#[tokio::test]
async fn followers_query_carries_paging() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"followers":[{"line_user_id":"U1","status":"active"}],"total":1,"page":3,"limit":25}"#,
    )
    .await;

    let page = client(&base).get_line_followers(3, 25, " som chai ").await.unwrap();
    let captured = server.await.unwrap();

    assert_eq!(
        captured.request_line(),
        "GET /api/admin/line-followers?page=3&limit=25&search=som+chai HTTP/1.1"
    );
    assert_eq!(page.followers.len(), 1);
    assert_eq!(page.total_pages(), 1);
}

#[tokio::test]
async fn generate_posts_multipart_form() {
    let (base, server) = serve_once(
        "201 Created",
        r#"{"id":17,"user_id":"U1","risk_level":"high","confidence_score":0.72}"#,
    )
    .await;

    let draft = RecommendationDraft {
        user_id: "U1".into(),
        average_glucose: 168.0,
        a1c_level: 7.5,
        in_range_percentage: 48.0,
        total_readings: 30,
        notes: "night shifts".into(),
        focus_areas: vec!["diet".into(), "exercise".into()],
    };
    let rec = client(&base).generate_health_recommendation(&draft).await.unwrap();
    let captured = server.await.unwrap();

    assert_eq!(captured.request_line(), "POST /api/health/recommendations HTTP/1.1");
    assert!(captured
        .header("content-type")
        .unwrap()
        .starts_with("multipart/form-data"));
    assert!(captured.body.contains("name=\"user_id\""));
    assert!(captured.body.contains("night shifts"));
    assert!(captured.body.contains("diet,exercise"));
    assert_eq!(rec.id, "17");
    assert_eq!(rec.risk_level, RiskLevel::High);
}

#[tokio::test]
async fn update_flow_sends_json_body() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"data":{"id":"f1","name":"Default v2","is_active":true}}"#,
    )
    .await;

    let flow = FollowEventFlow {
        id: "f1".into(),
        name: "Default v2".into(),
        ..Default::default()
    };
    let saved = client(&base).update_follow_flow("f1", &flow).await.unwrap();
    let captured = server.await.unwrap();

    assert_eq!(captured.request_line(), "PUT /api/follow-flows/f1 HTTP/1.1");
    let sent: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(sent["name"], "Default v2");
    assert!(sent.get("created_at").is_none());
    assert_eq!(saved.name, "Default v2");
    assert!(saved.is_active);
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}/api", addr))
        .get_bot_settings()
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
    assert_eq!(err.server_message(), None);
}

const SETTINGS: &str = r#"{"channel_id":"1657000001","channel_secret":"s3cr3t","channel_access_token":"token-abcdef","rate_limit_per_minute":60}"#;

#[tokio::test]
async fn settings_ack_is_not_taken_as_saved_settings() {
    let (base, server) = serve(vec![
        ("200 OK", SETTINGS),
        ("200 OK", r#"{"success":true,"message":"Settings saved"}"#),
    ])
    .await;
    let client = client(&base);

    let mut view = SettingsView::new();
    view.load(&client).await.unwrap();
    assert!(view.edit());
    if let Some(draft) = view.editor.draft_mut() {
        draft.channel_access_token = "rotated".into();
    }
    let err = view.save(&client).await.unwrap_err();
    let captured = server.await.unwrap();

    assert_eq!(captured[1].request_line(), "POST /api/bot/settings HTTP/1.1");
    assert!(matches!(err, EditorError::Gateway(GatewayError::Decode(_))));
    let stored = view.settings().unwrap();
    assert_eq!(stored.channel_id, "1657000001");
    assert_eq!(stored.channel_access_token, "token-abcdef");
    match view.editor.state() {
        DialogState::Open { draft, .. } => assert_eq!(draft.channel_access_token, "rotated"),
        other => panic!("draft should be kept, got {:?}", other),
    }
}

#[tokio::test]
async fn in_band_failure_surfaces_server_message() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"success":false,"message":"Database unavailable"}"#,
    )
    .await;

    let mut view = PatientsView::new(Thresholds::default());
    let notice = view.load(&client(&base)).await.unwrap_err();
    server.await.unwrap();

    assert_eq!(notice.message, "Database unavailable");
    assert!(view.all().is_empty());
}

#[tokio::test]
async fn in_band_failure_on_save_is_a_server_error() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"success":false,"message":"Invalid channel access token"}"#,
    )
    .await;

    let settings = serde_json::from_str(SETTINGS).unwrap();
    let err = client(&base).save_bot_settings(&settings).await.unwrap_err();
    server.await.unwrap();

    match &err {
        GatewayError::Server { status, message } => {
            assert_eq!(*status, 200);
            assert_eq!(message, "Invalid channel access token");
        }
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn list_body_without_the_list_is_a_decode_error() {
    let (base, server) = serve_once("200 OK", r#"{"count":0}"#).await;

    let err = client(&base).get_follow_flows().await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn created_flow_without_id_is_rejected() {
    let (base, server) = serve_once(
        "201 Created",
        r#"{"success":true,"message":"Flow created"}"#,
    )
    .await;

    let mut view = FlowsView::new();
    view.open_new(FollowEventFlow {
        name: "Ramadan".into(),
        welcome_message: "Welcome".into(),
        steps: vec![OnboardingStep::new(StepType::Text, "Send a DTX reading")],
        ..Default::default()
    });
    let err = view.save(&client(&base)).await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, EditorError::Gateway(GatewayError::Decode(_))));
    assert!(view.all().is_empty());
    assert!(view.editor.is_open());
}
