//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
// These tests exercise the SDK against a live CoralDB instance. They are
// skipped unless CORALDB_ENDPOINT is set in the environment.
use coraldb::types::{Consistency, TableLimits, TableState};
use coraldb::CoralError;
use coraldb::DeleteRangeRequest;
use coraldb::DeleteRequest;
use coraldb::GetRequest;
use coraldb::Handle;
use coraldb::HandleBuilder;
use coraldb::ListTablesRequest;
use coraldb::PutRequest;
use coraldb::QueryRequest;
use coraldb::TableRequest;
use coraldb::TableResult;
use coraldb::WriteBatchRequest;
use serde_json::json;

use std::env;
use std::error::Error;
use std::time::Duration;

fn live_endpoint_configured() -> bool {
    env::var("CORALDB_ENDPOINT").is_ok()
}

fn get_builder() -> Result<HandleBuilder, CoralError> {
    Handle::builder()
        .timeout(Duration::from_secs(30))?
        // this will override any defaults above
        .from_environment()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn smoke_test() -> Result<(), Box<dyn Error>> {
    if !live_endpoint_configured() {
        return Ok(());
    }
    // Set up a tracing subscriber to see output based on RUST_LOG environment setting
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_ansi(false)
        .compact()
        .init();

    let handle = get_builder()?.build().await?;

    TableRequest::new("testusers")
        .statement(
            "create table if not exists testusers (id integer, name string,
            created timestamp(3), primary key(id))",
        )
        .limits(&TableLimits::provisioned(1000, 1000, 10))
        .execute(&handle)
        .await?
        .wait_for_completion_ms(&handle, 15000, 500)
        .await?;

    let putres = PutRequest::new("testusers")
        .timeout(&Duration::from_millis(3000))
        .value(json!({"id": 10, "name": "jane"}))
        .ttl(&Duration::new(7200, 0))
        .execute(&handle)
        .await?;
    println!("PutResult={:?}", putres);
    assert!(putres.success());
    let putver = putres
        .version()
        .expect("put should have returned a version")
        .clone();

    // overwrite the row, conditional on the version
    let putres2 = PutRequest::new("testusers")
        .timeout(&Duration::from_millis(3000))
        .value(json!({"id": 10, "name": "john"}))
        .if_version(&putver)
        .execute(&handle)
        .await?;
    println!("PutResult2={:?}", putres2);
    assert!(putres2.success());

    // a stale version is a success-typed condition failure, not an error
    let putres3 = PutRequest::new("testusers")
        .value(json!({"id": 10, "name": "jasper"}))
        .if_version(&putver)
        .return_row(true)
        .execute(&handle)
        .await?;
    assert!(!putres3.success());

    let getres = GetRequest::new("testusers")
        .key(json!({"id": 10}))
        .consistency(Consistency::Absolute)
        .execute(&handle)
        .await?;
    println!("GetResult={:?}", getres);
    let getver = getres
        .version()
        .expect("get should have returned a version")
        .clone();
    assert_eq!(
        getres.row().and_then(|r| r.get("name")).and_then(|v| v.as_str()),
        Some("john")
    );

    for i in 20..30 {
        let _ = PutRequest::new("testusers")
            .value(json!({"id": i, "name": "somename"}))
            .execute(&handle)
            .await?;
    }

    // full-result query
    let qres = QueryRequest::new("select * from testusers")
        .execute(&handle)
        .await?;
    println!("QueryResult: rows={}", qres.rows().len());
    assert_eq!(qres.rows().len(), 11);

    // page-at-a-time query
    let mut pages = QueryRequest::new("select * from testusers order by id")
        .max_read_kb(1)
        .into_iterable(&handle);
    let mut rows = 0;
    while let Some(page) = pages.next_page().await {
        rows += page?.rows().len();
    }
    assert_eq!(rows, 11);

    // prepared query with a bind variable
    let prep = QueryRequest::new("select * from testusers where id = $id")
        .prepare_only()
        .execute(&handle)
        .await?;
    let mut qreq = QueryRequest::new_prepared(&prep.prepared_statement());
    qreq.set_variable("$id", json!(25))?;
    let qres1 = qreq.execute(&handle).await?;
    assert_eq!(qres1.rows().len(), 1);

    let delres = DeleteRequest::new("testusers", json!({"id": 10}))
        .if_version(&getver)
        .execute(&handle)
        .await?;
    println!("delres={:?}", delres);
    assert!(delres.success());

    let ltres = ListTablesRequest::new().execute(&handle).await?;
    println!("ltres={:?}", ltres);
    assert!(ltres.tables().iter().any(|t| t == "testusers"));

    TableRequest::new("testusers")
        .statement("drop table if exists testusers")
        .timeout(&Duration::from_millis(30000))
        .execute(&handle)
        .await?
        .wait_for_completion_ms(&handle, 15000, 500)
        .await?;

    // polling by name treats a missing table as successfully dropped
    let dropped = TableResult::wait_for_state(
        &handle,
        "testusers",
        TableState::Dropped,
        Duration::from_secs(15),
        Duration::from_millis(500),
    )
    .await?;
    assert_eq!(dropped.state(), TableState::Dropped);

    Ok(())
}

#[tokio::test]
async fn write_batch_test() -> Result<(), Box<dyn Error>> {
    if !live_endpoint_configured() {
        return Ok(());
    }
    let handle = get_builder()?.build().await?;

    TableRequest::new("testpeople")
        .statement(
            "create table if not exists testpeople (shard integer, id long,
            name string, city string, primary key(shard(shard), id))",
        )
        .limits(&TableLimits::provisioned(100, 100, 10))
        .execute(&handle)
        .await?
        .wait_for_completion_ms(&handle, 15000, 500)
        .await?;

    let res = WriteBatchRequest::new("testpeople")
        .add_put(PutRequest::new("").value(json!({
            "shard": 1, "id": 123456789, "name": "John", "city": "Anytown"})))
        .add_put(PutRequest::new("").value(json!({
            "shard": 1, "id": 123456788, "name": "Jane", "city": "Anytown"})))
        .add_put(PutRequest::new("").value(json!({
            "shard": 1, "id": 123456787, "name": "Joe", "city": "Anytown"})))
        .execute(&handle)
        .await?;
    println!("write_batch result={:?}", res);
    assert_eq!(res.failed_operation_index(), -1);
    assert_eq!(res.results().len(), 3);
    assert!(res.results().iter().all(|r| r.success()));

    // an if_absent put against an existing key aborts the whole batch
    let res = WriteBatchRequest::new("testpeople")
        .add_put(PutRequest::new("").value(json!({
            "shard": 1, "id": 123456786, "name": "Jill", "city": "Anytown"})))
        .add_put(
            PutRequest::new("")
                .value(json!({
                    "shard": 1, "id": 123456789, "name": "Dup", "city": "Anytown"}))
                .if_absent()
                .abort_on_fail(true),
        )
        .execute(&handle)
        .await?;
    println!("write_batch abort result={:?}", res);
    assert_eq!(res.failed_operation_index(), 1);
    assert_eq!(res.results().len(), 1);

    // range-delete the shard, following the continuation protocol
    let mut deleted = 0;
    let mut req = DeleteRangeRequest::new("testpeople", json!({"shard": 1}));
    loop {
        let res = req.execute(&handle).await?;
        deleted += res.num_deleted();
        match res.continuation_key() {
            Some(key) => req = req.continuation_key(key),
            None => break,
        }
    }
    assert!(deleted >= 3);

    TableRequest::new("testpeople")
        .statement("drop table if exists testpeople")
        .execute(&handle)
        .await?
        .wait_for_completion_ms(&handle, 15000, 500)
        .await?;

    Ok(())
}
