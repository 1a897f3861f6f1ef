//! Integration tests for the batch lifecycle over HTTP.

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use crate::common::{api_url, create_batch, start_controller};

async fn put_json(client: &Client, url: String, body: Value) -> (StatusCode, Value) {
    let resp = client.put(url).json(&body).send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn batch_runs_to_completion() {
    let (port, _controller) = start_controller(None).await;
    let client = Client::new();

    let (status, batch) = create_batch(&client, port, 5).await;
    assert_eq!(status, 201);
    assert_eq!(batch["status"], "Ongoing");
    assert_eq!(batch["potsDoneCount"], 0);
    let id = batch["id"].as_str().unwrap().to_owned();

    let signal: Value = client
        .get(api_url(port, "/device-control"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(signal["isRunning"], true);

    let (status, batch) = put_json(
        &client,
        api_url(port, &format!("/batches/{id}")),
        json!({"potsIncrement": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(batch["potsDoneCount"], 3);
    assert_eq!(batch["status"], "Ongoing");

    // Overshooting the target clamps the count
    let (_, batch) = put_json(
        &client,
        api_url(port, &format!("/batches/{id}")),
        json!({"potsIncrement": 4}),
    )
    .await;
    assert_eq!(batch["potsDoneCount"], 5);
    assert_eq!(batch["status"], "Finished");

    let machine: Value = client
        .get(api_url(port, "/machine-state"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(machine["activeBatchId"].is_null());

    let (status, body) = put_json(
        &client,
        api_url(port, &format!("/batches/{id}")),
        json!({"potsIncrement": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "This batch is already complete.");
}

#[tokio::test]
async fn second_batch_is_rejected_while_one_is_active() {
    let (port, _controller) = start_controller(None).await;
    let client = Client::new();

    let (status, _) = create_batch(&client, port, 5).await;
    assert_eq!(status, 201);
    let (status, body) = create_batch(&client, port, 5).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "A batch is already in progress.");

    let batches: Vec<Value> = client
        .get(api_url(port, "/batches"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(batches.len(), 1);
}

#[tokio::test]
async fn depleted_supplies_pause_and_block() {
    let (port, _controller) = start_controller(None).await;
    let client = Client::new();

    let (_, batch) = create_batch(&client, port, 5).await;
    let id = batch["id"].as_str().unwrap().to_owned();

    let (status, machine) = put_json(
        &client,
        api_url(port, "/machine-state"),
        json!({"soilLevel": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(machine["soilLevel"], 0);

    let batch: Value = client
        .get(api_url(port, &format!("/batches/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(batch["status"], "Paused");

    let (status, _) = put_json(
        &client,
        api_url(port, "/machine-state"),
        json!({"soilLevel": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let batch: Value = client
        .get(api_url(port, &format!("/batches/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(batch["status"], "Ongoing");

    // Cancel, deplete, and try to start again
    let (status, batch) = put_json(
        &client,
        api_url(port, &format!("/batches/{id}/cancel")),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(batch["status"], "Cancelled");

    put_json(&client, api_url(port, "/machine-state"), json!({"cupLevel": 0})).await;
    let (status, body) = create_batch(&client, port, 5).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Cannot start: Supplies are low.");

    let (status, _) = put_json(
        &client,
        api_url(port, "/machine-state"),
        json!({"cupLevel": 7}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn active_batch_cannot_be_deleted() {
    let (port, _controller) = start_controller(None).await;
    let client = Client::new();

    let (_, batch) = create_batch(&client, port, 5).await;
    let id = batch["id"].as_str().unwrap().to_owned();
    let url = api_url(port, &format!("/batches/{id}"));

    let resp = client.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Cannot delete an active batch. Please cancel it first."
    );

    put_json(&client, format!("{url}/cancel"), json!({})).await;
    let resp = client.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Batch Deleted Successfully");

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = client.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (port, _controller) = start_controller(None).await;
    let client = Client::new();

    let (status, _) = create_batch(&client, port, 0).await;
    assert_eq!(status, 400);

    let resp = client
        .post(api_url(port, "/batches"))
        .json(&json!({"title": "missing fields"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (_, batch) = create_batch(&client, port, 5).await;
    let id = batch["id"].as_str().unwrap().to_owned();
    let (status, body) = put_json(
        &client,
        api_url(port, &format!("/batches/{id}")),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No pot increment provided");

    let (status, _) = put_json(
        &client,
        api_url(port, "/batches/does-not-exist/cancel"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
