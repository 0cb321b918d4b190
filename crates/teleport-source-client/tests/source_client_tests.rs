use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolEvent;
use serde_json::{json, Value};
use teleport_source_client::abi::{decode_observed, TeleportInitiated};
use teleport_source_client::{
    EventSource, EventSourceConfig, LogFetcher, LogPosition, SourceClient, SourceItem,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers JSON-RPC calls with a fixed result per method, echoing the request id
struct JsonRpcResponder {
    results: HashMap<&'static str, Value>,
}

impl Respond for JsonRpcResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("request is JSON");
        let method = body["method"].as_str().expect("request has a method");
        match self.results.get(method) {
            Some(result) => ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "result": result,
            })),
            None => ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": {"code": -32601, "message": "method not found"},
            })),
        }
    }
}

const CONTRACT: Address = Address::repeat_byte(0xaa);

fn teleport_log_json(asset_id: u64, owner: Address, block_number: u64, log_index: u64) -> Value {
    let data = TeleportInitiated {
        tokenId: U256::from(asset_id),
        owner,
        timestamp: U256::from(1_700_000_000u64),
        metadataHash: "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG".to_string(),
    }
    .encode_log_data();
    json!({
        "address": CONTRACT,
        "topics": data.topics(),
        "data": data.data,
        "blockNumber": format!("{block_number:#x}"),
        "blockHash": format!("0x{}", "11".repeat(32)),
        "transactionHash": format!("0x{}", "22".repeat(32)),
        "transactionIndex": "0x0",
        "logIndex": format!("{log_index:#x}"),
        "removed": false,
    })
}

async fn mock_source_ledger(head: u64, logs: Vec<Value>) -> MockServer {
    let server = MockServer::start().await;
    let mut results = HashMap::new();
    results.insert("eth_blockNumber", json!(format!("{head:#x}")));
    results.insert("eth_getLogs", Value::Array(logs));
    Mock::given(method("POST"))
        .respond_with(JsonRpcResponder { results })
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn source_client_reads_block_number_and_safe_head() {
    let server = mock_source_ledger(0x1234, vec![]).await;
    let client = SourceClient::new(server.uri(), None, CONTRACT).expect("failed to create client");

    assert_eq!(client.get_block_number().await.expect("eth_blockNumber"), 0x1234);
    assert_eq!(client.safe_head(4).await.expect("safe head"), 0x1230);
    assert_eq!(client.safe_head(0x2000).await.expect("safe head"), 0);
}

#[tokio::test]
async fn source_client_fetches_and_decodes_teleport_logs() {
    let owner = Address::repeat_byte(0x42);
    let server = mock_source_ledger(
        100,
        vec![teleport_log_json(7, owner, 90, 3), teleport_log_json(8, owner, 91, 0)],
    )
    .await;
    let client = SourceClient::new(server.uri(), None, CONTRACT).expect("failed to create client");

    let logs = client.get_teleport_logs(80, 99).await.expect("eth_getLogs");
    assert_eq!(logs.len(), 2);

    let observed = decode_observed(&logs[0]).expect("log decodes");
    assert_eq!(observed.position, LogPosition::new(90, 3));
    assert_eq!(observed.event.source_asset_id, U256::from(7));
    assert_eq!(observed.event.owner, owner);
    assert_eq!(
        observed.event.metadata_digest,
        "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"
    );
}

#[tokio::test]
async fn source_client_filters_by_contract_and_topic() {
    let server = mock_source_ledger(100, vec![]).await;
    let client = SourceClient::new(server.uri(), None, CONTRACT).expect("failed to create client");
    let logs = client.get_teleport_logs(10, 20).await.expect("eth_getLogs");
    assert!(logs.is_empty());

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).expect("request is JSON");
    assert_eq!(body["method"], "eth_getLogs");
    let filter = &body["params"][0];
    assert_eq!(filter["fromBlock"], "0xa");
    assert_eq!(filter["toBlock"], "0x14");

    let filter = filter.to_string().to_lowercase();
    assert!(filter.contains(&CONTRACT.to_string().to_lowercase()));
    assert!(filter.contains(&TeleportInitiated::SIGNATURE_HASH.to_string()));
}

#[tokio::test]
async fn source_client_does_not_retry_rpc_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(JsonRpcResponder {
            results: HashMap::new(),
        })
        .expect(1)
        .mount(&server)
        .await;

    let client = SourceClient::new(server.uri(), None, CONTRACT).expect("failed to create client");
    let err = client.get_block_number().await.expect_err("method is unknown");
    assert!(err.is_transport());
}

#[tokio::test]
async fn event_source_over_rpc_yields_events_then_checkpoint() {
    let owner = Address::repeat_byte(0x42);
    let server = mock_source_ledger(
        12,
        vec![teleport_log_json(1, owner, 5, 0), teleport_log_json(2, owner, 9, 2)],
    )
    .await;
    let client = SourceClient::new(server.uri(), None, CONTRACT).expect("failed to create client");

    let config = EventSourceConfig {
        start_block: 0,
        confirmation_lag: 2,
        max_block_range: 1000,
        poll_interval: Duration::from_millis(10),
        max_reconnect_interval: Duration::from_millis(10),
    };
    let mut source = EventSource::new(client, config, None);

    let mut assets = Vec::new();
    let watermark = loop {
        match source.next().await {
            SourceItem::Event(observed) => assets.push(observed.event.source_asset_id),
            SourceItem::Checkpoint(watermark) => break watermark,
        }
    };
    assert_eq!(assets, vec![U256::from(1), U256::from(2)]);
    assert_eq!(watermark, LogPosition::end_of_block(10));
}
