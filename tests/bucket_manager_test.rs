use cbdrive::{
    BucketAuthMode, BucketManager, BucketSpec, ClusterEndpoint, ControlPlaneClient, Credentials,
    DriverConfig, DriverError, ServerCapabilities, ServerVersion,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> DriverConfig {
    DriverConfig {
        poll_interval_ms: 10,
        delete_retry_backoff_ms: 10,
        client_request_deadline_secs: 2,
        rebalance_deadline_secs: 3,
        request_timeout_secs: 5,
        ..DriverConfig::default()
    }
}

fn control_client(server: &MockServer, config: &DriverConfig) -> ControlPlaneClient {
    let endpoint = ClusterEndpoint::new(server.uri(), Credentials::default());
    ControlPlaneClient::new(endpoint, config).unwrap()
}

fn capabilities(version: &str) -> ServerCapabilities {
    ServerCapabilities::from_version(ServerVersion::parse(version).unwrap())
}

async fn mount_healthy_nodes(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/pools/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nodes": [{"status": "healthy", "hostname": "cb1:8091"}]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_total_ram_is_minimum_non_zero_node() {
    let server = MockServer::start().await;

    // One node still joining (0), one small, one large; sizing must follow
    // the smallest real node.
    Mock::given(method("GET"))
        .and(path("/pools/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nodes": [
                {"systemStats": {"mem_total": 0}},
                {"systemStats": {"mem_total": 8_000_000_000u64}},
                {"systemStats": {"mem_total": 16_000_000_000u64}}
            ]
        })))
        .mount(&server)
        .await;

    let config = test_config();
    let manager = BucketManager::new(
        control_client(&server, &config),
        capabilities("5.0.0-1234"),
        config,
    );

    assert_eq!(manager.total_ram_mb().await.unwrap(), 8_000);
    assert_eq!(manager.effective_ram_mb().await.unwrap(), 5_888);
}

#[tokio::test]
async fn test_detect_selects_auth_mode_from_version_probe() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "implementationVersion": "5.0.1-2037-enterprise"
        })))
        .mount(&server)
        .await;

    let config = test_config();
    let manager = BucketManager::detect(control_client(&server, &config), config)
        .await
        .unwrap();

    assert_eq!(manager.capabilities().bucket_auth(), BucketAuthMode::Rbac);
    assert_eq!(manager.capabilities().version().release(), "5.0.1");
}

#[tokio::test]
async fn test_all_zero_ram_stats_are_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nodes": [
                {"systemStats": {"mem_total": 0}},
                {"systemStats": {}}
            ]
        })))
        .mount(&server)
        .await;

    let config = test_config();
    let manager = BucketManager::new(
        control_client(&server, &config),
        capabilities("5.0.0-1234"),
        config,
    );

    let err = manager.total_ram_mb().await.unwrap_err();
    assert!(matches!(err, DriverError::NoRamReported));
}

#[tokio::test]
async fn test_create_bucket_rbac_provisions_scoped_user_and_waits() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pools/default/buckets"))
        .and(body_string_contains("name=data-bucket"))
        .and(body_string_contains("ramQuotaMB=256"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/settings/rbac/users/local/data-bucket"))
        .and(body_string_contains("roles=ro_admin,bucket_full_access[data-bucket]"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // Bucket warms up for two probe rounds before the key fetch answers
    // "key not found".
    Mock::given(method("GET"))
        .and(path(
            "/pools/default/buckets/data-bucket/docs/cbdrive-readiness-probe",
        ))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(
            "/pools/default/buckets/data-bucket/docs/cbdrive-readiness-probe",
        ))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    mount_healthy_nodes(&server).await;

    let config = test_config();
    let manager = BucketManager::new(
        control_client(&server, &config),
        capabilities("5.0.0-1234"),
        config,
    );

    let spec = BucketSpec::new("data-bucket", 256, BucketAuthMode::Rbac);
    manager.create_bucket(&spec).await.unwrap();
}

#[tokio::test]
async fn test_create_bucket_legacy_embeds_sasl_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pools/default/buckets"))
        .and(body_string_contains("authType=sasl"))
        .and(body_string_contains("proxyPort=11211"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    // No RBAC surface on a 4.x server.
    Mock::given(method("PUT"))
        .and(path("/settings/rbac/users/local/data-bucket"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(
            "/pools/default/buckets/data-bucket/docs/cbdrive-readiness-probe",
        ))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    mount_healthy_nodes(&server).await;

    let config = test_config();
    let manager = BucketManager::new(
        control_client(&server, &config),
        capabilities("4.1.0-5005"),
        config,
    );

    let spec = BucketSpec::new("data-bucket", 256, BucketAuthMode::LegacySasl);
    manager.create_bucket(&spec).await.unwrap();
}

#[tokio::test]
async fn test_delete_bucket_tolerates_missing_rbac_user() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/settings/rbac/users/local/b1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/pools/default/buckets/b1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config();
    let manager = BucketManager::new(
        control_client(&server, &config),
        capabilities("5.0.0-1234"),
        config,
    );

    manager.delete_bucket("b1").await.unwrap();
}

#[tokio::test]
async fn test_delete_all_buckets_single_clean_round() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/buckets"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"name": "b1"}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/settings/rbac/users/local/b1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/pools/default/buckets/b1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config();
    let manager = BucketManager::new(
        control_client(&server, &config),
        capabilities("5.0.0-1234"),
        config,
    );

    manager.delete_all_buckets().await.unwrap();
}

#[tokio::test]
async fn test_delete_all_buckets_exhausts_retry_rounds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/default/buckets"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"name": "b1"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/pools/default/buckets/b1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("unexpected server error"))
        .mount(&server)
        .await;

    let config = test_config();
    let manager = BucketManager::new(
        control_client(&server, &config),
        capabilities("4.1.0-5005"),
        config,
    );

    match manager.delete_all_buckets().await.unwrap_err() {
        DriverError::DeleteRetriesExhausted {
            attempts,
            remaining,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(remaining, vec!["b1".to_string()]);
        }
        other => panic!("expected DeleteRetriesExhausted, got {other:?}"),
    }
}
