use cbdrive::{
    ClusterEndpoint, ClusterHealth, ControlPlaneClient, Credentials, DriverConfig, DriverError,
    TopologyService,
};
use wiremock::matchers::{body_string, body_string_contains, method, path};
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

fn endpoint(url: &str) -> ClusterEndpoint {
    ClusterEndpoint::new(url, Credentials::default())
}

/// The task list starts empty, then reports a running rebalance, then a
/// finished one. Exercises both waiting phases.
async fn mount_rebalance_task_sequence(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/pools/default/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pools/default/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"type": "rebalance", "status": "running"}
        ])))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pools/default/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"type": "rebalance", "status": "notRunning"}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_add_node_retries_until_cluster_manager_accepts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/controller/addNode"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unable to add node"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/controller/addNode"))
        .and(body_string_contains("hostname=cb2"))
        .and(body_string_contains("services=kv"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config();
    let topology = TopologyService::new(control_client(&server, &config), config);

    topology
        .add_node(&endpoint("http://cb2:8091"), "kv")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rebalance_out_sends_exact_node_lists() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/controller/rebalance"))
        .and(body_string("ejectedNodes=ns_1@b&knownNodes=ns_1@a,ns_1@b,"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_rebalance_task_sequence(&server).await;

    let config = test_config();
    let topology = TopologyService::new(control_client(&server, &config), config);

    let servers = [endpoint("http://a:8091"), endpoint("http://b:8091")];
    topology.rebalance_out(&servers, &servers[1]).await.unwrap();
}

#[tokio::test]
async fn test_rebalance_in_appends_new_node_last() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/controller/rebalance"))
        .and(body_string("knownNodes=ns_1@a,ns_1@b,ns_1@c"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_rebalance_task_sequence(&server).await;

    let config = test_config();
    let topology = TopologyService::new(control_client(&server, &config), config);

    let servers = [endpoint("http://a:8091"), endpoint("http://b:8091")];
    topology
        .rebalance_in(&servers, &endpoint("http://c:8091"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_recover_requests_delta_recovery() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/controller/setRecoveryType"))
        .and(body_string("otpNode=ns_1@cb2&recoveryType=delta"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config();
    let topology = TopologyService::new(control_client(&server, &config), config);

    topology.recover(&endpoint("http://cb2:8091")).await.unwrap();
}

#[tokio::test]
async fn test_verify_server_version() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "implementationVersion": "5.0.1-2037-enterprise"
        })))
        .mount(&server)
        .await;

    let config = test_config();
    let topology = TopologyService::new(control_client(&server, &config), config);

    // A bare release matches any build of it.
    topology.verify_server_version("5.0.1").await.unwrap();
    topology.verify_server_version("5.0.1-2037").await.unwrap();

    match topology.verify_server_version("4.6.2").await.unwrap_err() {
        DriverError::VersionMismatch { expected, running } => {
            assert_eq!(expected, "4.6.2");
            assert_eq!(running, "5.0.1-2037");
        }
        other => panic!("expected VersionMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_verify_no_running_services_flags_answering_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let config = test_config();
    let topology = TopologyService::new(control_client(&server, &config), config);

    let still_up = endpoint(&server.uri());
    match topology
        .verify_no_running_services(std::slice::from_ref(&still_up))
        .await
        .unwrap_err()
    {
        DriverError::ServicesStillRunning(urls) => {
            assert_eq!(urls, vec![still_up.base_url().to_string()]);
        }
        other => panic!("expected ServicesStillRunning, got {other:?}"),
    }
}

/// Grab a local port with nothing listening on it. The listener is bound
/// only to learn the address and closed before returning.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

#[tokio::test]
async fn test_verify_no_running_services_accepts_refused_connection() {
    let server = MockServer::start().await;
    let config = test_config();
    let topology = TopologyService::new(control_client(&server, &config), config);

    let dead_endpoint = endpoint(&closed_port_url());

    topology
        .verify_no_running_services(std::slice::from_ref(&dead_endpoint))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_wait_for_ready_state_outlasts_warmup() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nodes": [
                {"status": "healthy", "hostname": "cb1:8091"},
                {"status": "warmup", "hostname": "cb2:8091"}
            ]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pools/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nodes": [
                {"status": "healthy", "hostname": "cb1:8091"},
                {"status": "healthy", "hostname": "cb2:8091"}
            ]
        })))
        .mount(&server)
        .await;

    let config = test_config();
    let health = ClusterHealth::new(control_client(&server, &config), config);

    health.wait_for_ready_state().await.unwrap();
}

#[tokio::test]
async fn test_wait_until_unreachable_succeeds_once_port_closes() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // A hand-rolled listener whose port actually closes when the task is
    // aborted. It answers 500 to everything while up, the expected symptom
    // of a node on its way down.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                )
                .await;
        }
    });

    let config = test_config();
    let dying = ClusterEndpoint::new(format!("http://{addr}"), Credentials::default());
    let client = ControlPlaneClient::new(dying, &config).unwrap();
    let health = ClusterHealth::new(client, config);

    let handle = tokio::spawn(async move { health.wait_until_unreachable().await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    serving.abort();

    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_until_unreachable_succeeds_against_closed_port() {
    let config = test_config();
    let dead = ClusterEndpoint::new(closed_port_url(), Credentials::default());
    let client = ControlPlaneClient::new(dead, &config).unwrap();
    let health = ClusterHealth::new(client, config);

    health.wait_until_unreachable().await.unwrap();
}

#[tokio::test]
async fn test_wait_until_unreachable_times_out_while_still_up() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.client_request_deadline_secs = 1;
    let health = ClusterHealth::new(control_client(&server, &config), config);

    match health.wait_until_unreachable().await.unwrap_err() {
        DriverError::Timeout { operation, .. } => {
            assert_eq!(operation, "server shutdown");
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}
