use std::sync::Arc;
use std::time::Duration;

use page_dom::{DomHost, MemoryDom};
use serde_json::json;
use tour_controller::{
    Collaborators, MemoryMetricSink, MemoryResumeStore, StatusCode, TourState,
};
use tourguide::{Config, Engine};
use tourguide_core_types::{Scope, TourId};
use tourguide_policy_center::{default_policy, TourPolicy};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy() -> TourPolicy {
    let mut policy = default_policy();
    policy.pre_render.interval_ms = 20;
    policy.post_render.interval_ms = 50;
    policy.observer.position_poll_ms = 20;
    policy.observer.debounce_ms = 5;
    policy
}

fn flows() -> serde_json::Value {
    json!({
        "onboarding": {
            "templates": [
                {
                    "id": "welcome",
                    "route": "/orgs/{{orgId}}/home",
                    "target": [{ "selector": "button#welcome", "boundary": "none" }]
                }
            ],
            "scope": "prod"
        }
    })
}

async fn flow_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flows"))
        .and(body_json(json!({ "ids": ["onboarding"], "scope": "prod" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(flows()))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn engine(server: &MockServer) -> Engine {
    let config: Config = serde_yaml::from_str(&format!(
        "flow_endpoint: {}/flows\nroute_params:\n  orgId: \"42\"\n",
        server.uri()
    ))
    .unwrap();
    Engine::from_config(&config, fast_policy()).unwrap()
}

fn page(url: &str) -> MemoryDom {
    let dom = MemoryDom::new(url);
    let body = dom.append_element(dom.document(), "body", &[]).unwrap();
    dom.append_element(body, "button", &[("id", "welcome")])
        .unwrap();
    dom
}

async fn wait_for(controller: &tour_controller::TourController, state: TourState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while controller.state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {:?}, still {:?}", state, controller.state()));
}

#[tokio::test]
async fn tour_fetched_over_http_is_rendered() {
    let server = flow_server().await;
    let engine = engine(&server);
    let dom = page("https://app.test/orgs/42/home");
    let metrics = Arc::new(MemoryMetricSink::new());
    let host: Arc<dyn DomHost> = Arc::new(dom.clone());
    let controller = engine.controller(
        host,
        Collaborators {
            metrics: metrics.clone(),
            ..Collaborators::default()
        },
    );

    controller
        .start_tour(TourId::new("onboarding"), Scope::new("prod"))
        .await
        .unwrap();
    wait_for(&controller, TourState::PostValidating(0)).await;

    let statuses: Vec<_> = metrics
        .snapshot()
        .into_iter()
        .map(|m| m.status_code)
        .collect();
    assert_eq!(statuses, vec![StatusCode::Rendered]);
    assert!(engine.cache().contains(&TourId::new("onboarding")));

    controller.end_tour().unwrap();
    assert_eq!(controller.state(), TourState::Completed);
}

#[tokio::test]
async fn page_loads_share_one_fetch() {
    let server = flow_server().await;
    let engine = engine(&server);
    let store = Arc::new(MemoryResumeStore::new());

    for _ in 0..2 {
        let dom = page("https://app.test/orgs/42/home");
        let host: Arc<dyn DomHost> = Arc::new(dom.clone());
        let controller = engine.controller(
            host,
            Collaborators {
                store: store.clone(),
                ..Collaborators::default()
            },
        );
        controller
            .start_tour(TourId::new("onboarding"), Scope::new("prod"))
            .await
            .unwrap();
        wait_for(&controller, TourState::PostValidating(0)).await;
        controller.shutdown();
    }
    // `expect(1)` on the mock is verified when the server drops.
}

#[tokio::test]
async fn missing_endpoint_is_a_config_error() {
    let err = Engine::from_config(&Config::default(), default_policy())
        .err()
        .expect("no endpoint");
    assert!(err.to_string().contains("flow_endpoint"));
}
