//! Sync runs from a mock Aspire API into an in-memory DuckDB database.

use aspire_duck_sync::config::{AspireConfig, MotherDuckConfig, RetryConfig, SyncBehaviorConfig};
use aspire_duck_sync::{
    AspireClient, EntityMapping, KnownEntity, LoadMode, MotherDuckClient, RecordTable, SyncMode,
    Synchronizer, TableStore,
};
use serde_json::{Value as JsonValue, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Token": "tok"})))
        .mount(&server)
        .await;
    server
}

async fn mount_feed(server: &MockServer, entity: &str, filter: Option<&str>, records: JsonValue) {
    let first = Mock::given(method("GET"))
        .and(path(format!("/{}", entity)))
        .and(query_param("$pageNumber", "1"));
    let first = match filter {
        Some(f) => first.and(query_param("$filter", f)),
        None => first,
    };
    first
        .respond_with(ResponseTemplate::new(200).set_body_json(records))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/{}", entity)))
        .and(query_param("$pageNumber", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

fn aspire(server: &MockServer) -> AspireClient {
    let config = AspireConfig {
        base_url: server.uri(),
        client_id: "id".into(),
        client_secret: "secret".into(),
        ..Default::default()
    };
    AspireClient::new(config, RetryConfig::none()).unwrap()
}

fn warehouse() -> MotherDuckClient {
    MotherDuckClient::connect(MotherDuckConfig::in_memory()).unwrap()
}

fn properties_mapping(full_refresh: bool) -> EntityMapping {
    EntityMapping::builder()
        .entity(KnownEntity::Properties)
        .date_column("ModifiedDate")
        .full_refresh(full_refresh)
        .build()
        .unwrap()
}

fn sorted_by(table: &RecordTable, id: &str) -> Vec<JsonValue> {
    let mut records = table.to_json_records();
    records.sort_by_key(|r| r[id].as_i64());
    records
}

#[tokio::test]
async fn test_incremental_sync_upserts_delta() {
    let server = api().await;
    mount_feed(
        &server,
        "Properties",
        Some("ModifiedDate ge 2021-01-01"),
        json!([
            {
                "PropertyID": 2,
                "ModifiedDate": "2021-02-01",
                "PropertyName": "B2",
                "PropertyContacts": [
                    {"PropertyContactID": 20, "ContactName": "Ann", "EmailInvoiceContact": true}
                ]
            },
            {"PropertyID": 4, "ModifiedDate": "2021-03-01", "PropertyName": "D", "PropertyContacts": []}
        ]),
    )
    .await;

    let store = warehouse();
    store
        .write_table(
            "aspire_Properties",
            &RecordTable::from_json_records(vec![
                json!({"PropertyID": 1, "ModifiedDate": "2020-06-01", "PropertyName": "A"}),
                json!({"PropertyID": 2, "ModifiedDate": "2021-01-01", "PropertyName": "B"}),
                json!({"PropertyID": 3, "ModifiedDate": "2020-12-31", "PropertyName": "C"}),
            ]),
        )
        .unwrap();

    let syncer = Synchronizer::new(aspire(&server), &store, SyncBehaviorConfig::default());
    let load = syncer
        .sync_entity(&properties_mapping(false), LoadMode::Incremental)
        .await
        .unwrap();

    assert_eq!(load.mode, LoadMode::Incremental);
    assert_eq!(load.watermark.as_deref(), Some("2021-01-01"));
    assert_eq!(load.records_fetched, 2);

    let stored = store.read_table("aspire_Properties").unwrap().unwrap();
    assert_eq!(
        sorted_by(&stored, "PropertyID"),
        vec![
            json!({"PropertyID": 1, "ModifiedDate": "2020-06-01", "PropertyName": "A"}),
            json!({"PropertyID": 2, "ModifiedDate": "2021-02-01", "PropertyName": "B2"}),
            json!({"PropertyID": 3, "ModifiedDate": "2020-12-31", "PropertyName": "C"}),
            json!({"PropertyID": 4, "ModifiedDate": "2021-03-01", "PropertyName": "D"}),
        ]
    );

    let contacts = store.read_table("aspire_PropertyContacts").unwrap().unwrap();
    assert_eq!(
        contacts.to_json_records(),
        vec![json!({"ContactName": "Ann", "PropertyContactID": 20, "PropertyID": 2})]
    );
}

#[tokio::test]
async fn test_full_run_writes_parent_and_child_tables() {
    let server = api().await;
    mount_feed(
        &server,
        "Properties",
        Some("ModifiedDate ge 2015-01-01"),
        json!([
            {
                "PropertyID": 10,
                "ModifiedDate": "2022-05-01T08:30:00",
                "PropertyTags": ["x"],
                "SeparateInvoices": 1,
                "PropertyContacts": [
                    {"PropertyContactID": 100, "ContactName": "Bo"},
                    {"PropertyContactID": 101, "ContactName": "Cy"}
                ]
            },
            {
                "PropertyID": 11,
                "ModifiedDate": "2022-05-02T08:30:00",
                "SeparateInvoices": "0",
                "PropertyContacts": []
            }
        ]),
    )
    .await;

    let store = warehouse();
    let syncer = Synchronizer::new(aspire(&server), &store, SyncBehaviorConfig::default());
    let mappings = [properties_mapping(false)];
    let result = syncer.run(&mappings, SyncMode::Full).await.unwrap();

    assert!(result.success);
    assert_eq!(result.total_fetched(), 2);
    let entity = &result.entities[0];
    assert_eq!(entity.mode, LoadMode::Full);
    assert_eq!(entity.tables_written.get("aspire_Properties"), Some(&2));
    assert_eq!(entity.tables_written.get("aspire_PropertyContacts"), Some(&2));

    let parent = store.read_table("aspire_Properties").unwrap().unwrap();
    assert_eq!(
        sorted_by(&parent, "PropertyID"),
        vec![
            json!({"PropertyID": 10, "ModifiedDate": "2022-05-01T08:30:00", "SeparateInvoices": true}),
            json!({"PropertyID": 11, "ModifiedDate": "2022-05-02T08:30:00", "SeparateInvoices": false}),
        ]
    );

    let contacts = store.read_table("aspire_PropertyContacts").unwrap().unwrap();
    assert_eq!(
        sorted_by(&contacts, "PropertyContactID"),
        vec![
            json!({"ContactName": "Bo", "PropertyContactID": 100, "PropertyID": 10}),
            json!({"ContactName": "Cy", "PropertyContactID": 101, "PropertyID": 10}),
        ]
    );

    let status = syncer.status(&mappings[0]).unwrap();
    assert_eq!(status.rows, Some(2));
    assert_eq!(status.watermark.as_deref(), Some("2022-05-02"));
}

#[tokio::test]
async fn test_empty_full_refresh_drops_stored_tables() {
    let server = api().await;
    mount_feed(&server, "Properties", Some("ModifiedDate ge 2015-01-01"), json!([])).await;

    let store = warehouse();
    store
        .write_table(
            "aspire_Properties",
            &RecordTable::from_json_records(vec![json!({"PropertyID": 1, "ModifiedDate": "2020-01-01"})]),
        )
        .unwrap();
    store
        .write_table(
            "aspire_PropertyContacts",
            &RecordTable::from_json_records(vec![json!({"PropertyID": 1, "PropertyContactID": 5})]),
        )
        .unwrap();

    let syncer = Synchronizer::new(aspire(&server), &store, SyncBehaviorConfig::default());
    let result = syncer.run(&[properties_mapping(true)], SyncMode::Incremental).await.unwrap();

    assert!(result.success);
    assert_eq!(result.entities[0].parent_rows, 0);
    assert!(store.read_table("aspire_Properties").unwrap().is_none());
    assert!(store.read_table("aspire_PropertyContacts").unwrap().is_none());
}

#[tokio::test]
async fn test_failed_feed_does_not_stop_the_run() {
    let server = api().await;
    Mock::given(method("GET"))
        .and(path("/WorkTickets"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such feed"))
        .mount(&server)
        .await;
    mount_feed(&server, "Services", None, json!([{"ServiceID": 1, "ServiceName": "Mowing"}])).await;

    let store = warehouse();
    let syncer = Synchronizer::new(aspire(&server), &store, SyncBehaviorConfig::default());
    let mappings = [
        EntityMapping::builder()
            .entity(KnownEntity::WorkTickets)
            .date_column("LastModifiedDateTime")
            .build()
            .unwrap(),
        EntityMapping::builder()
            .entity(KnownEntity::Services)
            .full_refresh(true)
            .build()
            .unwrap(),
    ];

    let result = syncer.run(&mappings, SyncMode::Incremental).await.unwrap();

    assert!(!result.success);
    let failed: Vec<_> = result.failed().map(|e| e.entity.as_str()).collect();
    assert_eq!(failed, vec!["WorkTickets"]);
    assert!(result.entities[0].error.as_deref().unwrap().contains("FETCH_ERROR"));

    assert!(store.read_table("aspire_WorkTickets").unwrap().is_none());
    let services = store.read_table("aspire_Services").unwrap().unwrap();
    assert_eq!(
        services.to_json_records(),
        vec![json!({"ServiceID": 1, "ServiceName": "Mowing"})]
    );
}
