use axum::body::Bytes;
use axum::http::StatusCode;
use axum_test::TestServer;
use modeltree::api::{create_router, SecurityConfig};
use modeltree::codec::serialize_data;
use modeltree::config::RemoteConfig;
use modeltree::model::{LocationSet, ModelTree, NodeValue, StorageLocation};
use modeltree::remote::{RemoteService, TransportError};
use modeltree::store::{MemoryStore, PayloadKind, SqliteStore};
use modeltree::{Endpoint, Format, ModelRegistry, RegistryError};

fn store() -> SqliteStore {
    let store = SqliteStore::open_memory().expect("Failed to create database");
    store.migrate().expect("Failed to migrate");
    store
}

fn setup(security: SecurityConfig) -> TestServer {
    TestServer::new(create_router(store(), security)).expect("Failed to create test server")
}

fn sample_data(format: Format) -> Vec<u8> {
    let mut tree = ModelTree::new("User");
    let root = tree.root();
    tree.add_child_value(root, "level", 7u8, StorageLocation::Server)
        .unwrap();
    serialize_data(&tree, root, LocationSet::empty(), format).unwrap()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok_without_auth() {
        let server = setup(SecurityConfig::with_api_key("secret"));
        let response = server.get("/api/v1/health").await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "ok");
    }
}

mod payloads {
    use super::*;

    #[tokio::test]
    async fn stores_and_returns_bytes_per_format() {
        let server = setup(SecurityConfig::disabled());

        for format in Format::ALL {
            let payload = sample_data(format);
            server
                .put(&format!("/api/v1/models/User/data?format={}", format))
                .bytes(Bytes::from(payload.clone()))
                .await
                .assert_status(StatusCode::NO_CONTENT);

            let response = server
                .get(&format!("/api/v1/models/User/data?format={}", format))
                .await;
            response.assert_status_ok();
            assert_eq!(response.as_bytes().to_vec(), payload);
            assert_eq!(
                response.header("content-type").to_str().unwrap(),
                format.content_type()
            );
        }

        let listed: Vec<serde_json::Value> = server.get("/api/v1/models/User").await.json();
        assert_eq!(listed.len(), 4);
    }

    #[tokio::test]
    async fn defaults_to_json() {
        let server = setup(SecurityConfig::disabled());
        server
            .put("/api/v1/models/User/structure")
            .text(r#"[{"path":"","location":"local","purpose":"User"}]"#)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get("/api/v1/models/User/structure?format=json")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn rejects_payloads_that_do_not_parse() {
        let server = setup(SecurityConfig::disabled());
        let response = server
            .put("/api/v1/models/User/data?format=binary")
            .bytes(Bytes::from_static(b"not a snapshot"))
            .await;

        response.assert_status_bad_request();
        server
            .get("/api/v1/models/User/data?format=binary")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn rejects_unknown_formats_and_kinds() {
        let server = setup(SecurityConfig::disabled());
        server
            .get("/api/v1/models/User/data?format=yaml")
            .await
            .assert_status_bad_request();
        server
            .get("/api/v1/models/User/values")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn deletes_once() {
        let server = setup(SecurityConfig::disabled());
        server
            .put("/api/v1/models/User/data?format=plain")
            .bytes(Bytes::from(sample_data(Format::Plain)))
            .await;

        server
            .delete("/api/v1/models/User/data?format=plain")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete("/api/v1/models/User/data?format=plain")
            .await
            .assert_status_not_found();
    }
}

mod auth {
    use super::*;

    #[tokio::test]
    async fn requires_bearer_token() {
        let server = setup(SecurityConfig::with_api_key("secret"));

        server
            .get("/api/v1/models")
            .await
            .assert_status_unauthorized();
        server
            .get("/api/v1/models")
            .authorization_bearer("wrong")
            .await
            .assert_status_unauthorized();
        server
            .get("/api/v1/models")
            .authorization_bearer("secret")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn login_issues_a_usable_token() {
        let server = setup(SecurityConfig::with_credentials("ada", "pw"));

        server
            .post("/api/v1/login")
            .json(&serde_json::json!({ "username": "ada", "password": "nope" }))
            .await
            .assert_status_unauthorized();

        let body: serde_json::Value = server
            .post("/api/v1/login")
            .json(&serde_json::json!({ "username": "ada", "password": "pw" }))
            .await
            .json();
        let token = body["token"].as_str().unwrap().to_string();

        server
            .get("/api/v1/models")
            .authorization_bearer(token)
            .await
            .assert_status_ok();
    }
}

/// Serves the router on a real socket from a background runtime, so the
/// blocking transport can reach it.
fn spawn_service(security: SecurityConfig) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();
    let app = create_router(store(), security);

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    format!("http://{}/api/v1", addr)
}

fn remote_config(url: &str) -> RemoteConfig {
    let mut config = RemoteConfig::default();
    config.set_url(url).unwrap();
    config
}

mod end_to_end {
    use super::*;

    #[test]
    fn health_over_http() {
        let url = spawn_service(SecurityConfig::disabled());
        let remote = RemoteService::from_config(remote_config(&url));
        assert!(remote.health().unwrap());
    }

    #[test]
    fn push_and_pull_through_the_service() {
        let url = spawn_service(SecurityConfig::with_credentials("ada", "pw"));
        let mut config = remote_config(&url);
        config.username = Some("ada".to_string());
        config.password = Some("pw".to_string());

        let mut origin = ModelRegistry::new(MemoryStore::new())
            .with_remote(RemoteService::from_config(config.clone()));
        let tree = origin.add_model("User").unwrap();
        let root = tree.root();
        let stats = tree.add_child(root, "stats", StorageLocation::Server).unwrap();
        tree.add_child_value(stats, "wins", 12u16, StorageLocation::Inherited)
            .unwrap();
        tree.add_child_value(root, "theme", "dark", StorageLocation::Local)
            .unwrap();

        origin
            .save_structure("User", Endpoint::Remote, Format::Xml)
            .unwrap();
        origin
            .save_data("User", Endpoint::Remote, Format::Xml, LocationSet::SERVER)
            .unwrap();
        assert!(origin.remote().unwrap().token().is_some());

        let mut replica = ModelRegistry::new(MemoryStore::new())
            .with_remote(RemoteService::from_config(config));
        replica.add_model("User").unwrap();
        assert_eq!(
            replica
                .load_structure("User", Endpoint::Remote, Format::Xml)
                .unwrap(),
            3
        );
        let report = replica
            .load_data("User", Endpoint::Remote, Format::Xml, LocationSet::empty())
            .unwrap();
        assert_eq!(report.applied, 1);

        let tree = replica.model("User").unwrap();
        assert_eq!(
            tree.value(tree.find("stats.wins").unwrap()),
            Some(NodeValue::U16(12))
        );
        assert_eq!(tree.value(tree.find("theme").unwrap()), None);
    }

    #[test]
    fn missing_remote_payload() {
        let url = spawn_service(SecurityConfig::disabled());
        let mut registry = ModelRegistry::new(MemoryStore::new())
            .with_remote(RemoteService::from_config(remote_config(&url)));
        registry.add_model("Nobody").unwrap();

        assert!(matches!(
            registry.load_structure("Nobody", Endpoint::Remote, Format::Json),
            Err(RegistryError::MissingPayload { .. })
        ));
    }

    #[test]
    fn rejected_token_without_credentials() {
        let url = spawn_service(SecurityConfig::with_api_key("secret"));
        let remote = RemoteService::from_config(remote_config(&url));

        assert!(matches!(
            remote.get("User", PayloadKind::Data, Format::Json),
            Err(TransportError::Unauthorized)
        ));
        remote.set_token(Some("secret".to_string()));
        assert_eq!(remote.get("User", PayloadKind::Data, Format::Json).unwrap(), None);
    }
}
