//! Contentful Client Tests
//!
//! Runs the client against a local warp stub of the management endpoints.
//!
use envmig_contentful::ContentfulClient;
use envmig_core::{
    Alias, ApiKey, BackendError, Entry, EnvironmentId, EnvironmentLink, EnvironmentStatus,
    LinkKind, ManagementApi, Secret,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const TOKEN: &str = "CFPAT-test";

type Json = warp::reply::WithStatus<warp::reply::Json>;

fn reply(value: &Value, status: StatusCode) -> Json {
    warp::reply::with_status(warp::reply::json(value), status)
}

fn link(link_type: &str, id: &str) -> Value {
    json!({ "sys": { "type": "Link", "linkType": link_type, "id": id } })
}

fn environment(id: &str, status: &str) -> Value {
    json!({
        "name": id,
        "sys": { "type": "Environment", "id": id, "version": 1, "status": link("Status", status) }
    })
}

fn api_key(id: &str, version: u64, environments: &[&str]) -> Value {
    let links: Vec<Value> = environments.iter().map(|e| link("Environment", e)).collect();
    json!({
        "name": format!("{id} key"),
        "sys": { "type": "ApiKey", "id": id, "version": version },
        "environments": links
    })
}

fn entry_sys(id: &str, version: u64) -> Value {
    json!({ "id": id, "version": version, "contentType": link("ContentType", "versionTracking") })
}

fn error(message: &str) -> Value {
    json!({ "sys": { "type": "Error", "id": "ServerError" }, "message": message })
}

/// Request body as JSON, whatever its declared media type
fn json_body() -> impl Filter<Extract = (Value,), Error = Rejection> + Clone {
    warp::body::bytes()
        .map(|body: warp::hyper::body::Bytes| serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn version_of(header: &str) -> u64 {
    header.parse().unwrap_or_default()
}

fn spaces() -> impl Filter<Extract = (Json,), Error = Rejection> + Clone {
    let space = warp::path!("spaces" / "space1")
        .and(warp::get())
        .map(|| {
            let space = json!({ "name": "Demo", "sys": { "type": "Space", "id": "space1" } });
            reply(&space, StatusCode::OK)
        });

    let get_environment = warp::path!("spaces" / "space1" / "environments" / String)
        .and(warp::get())
        .map(|id: String| match id.as_str() {
            "master" => reply(&environment("master", "ready"), StatusCode::OK),
            "broken" => reply(&error("boom"), StatusCode::INTERNAL_SERVER_ERROR),
            _ => reply(&error("The resource could not be found."), StatusCode::NOT_FOUND),
        });

    let create_environment = warp::path!("spaces" / "space1" / "environments" / String)
        .and(warp::put())
        .and(warp::header::exact("x-contentful-source-environment", "master"))
        .and(json_body())
        .map(|id: String, body: Value| {
            let mut created = environment(&id, "queued");
            created["name"] = body["name"].clone();
            reply(&created, StatusCode::CREATED)
        });

    let delete_environment = warp::path!("spaces" / "space1" / "environments" / String)
        .and(warp::delete())
        .map(|_id: String| reply(&Value::Null, StatusCode::NO_CONTENT));

    space.or(get_environment).unify().or(create_environment).unify().or(delete_environment).unify()
}

fn keys() -> impl Filter<Extract = (Json,), Error = Rejection> + Clone {
    let list = warp::path!("spaces" / "space1" / "api_keys")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(|query: HashMap<String, String>| {
            let items = match query.get("skip").map(String::as_str) {
                Some("0") | None => vec![api_key("delivery", 1, &["master"])],
                Some("1") => vec![api_key("preview", 3, &["master", "GH-feature-x"])],
                _ => vec![],
            };
            let page = json!({ "sys": { "type": "Array" }, "total": 2, "items": items });
            reply(&page, StatusCode::OK)
        });

    let update = warp::path!("spaces" / "space1" / "api_keys" / String)
        .and(warp::put())
        .and(warp::header::<String>("x-contentful-version"))
        .and(json_body())
        .map(|id: String, version: String, body: Value| {
            if version != "1" {
                return reply(&error("version mismatch"), StatusCode::CONFLICT);
            }
            let mut saved = body;
            saved["sys"] =
                json!({ "type": "ApiKey", "id": id, "version": version_of(&version) + 1 });
            reply(&saved, StatusCode::OK)
        });

    list.or(update).unify()
}

fn entries() -> impl Filter<Extract = (Json,), Error = Rejection> + Clone {
    let locales = warp::path!("spaces" / "space1" / "environments" / String / "locales")
        .and(warp::get())
        .map(|_env: String| {
            reply(
                &json!({
                    "total": 2,
                    "items": [
                        { "code": "de-DE", "default": false },
                        { "code": "en-US", "default": true }
                    ]
                }),
                StatusCode::OK,
            )
        });

    let list = warp::path!("spaces" / "space1" / "environments" / String / "entries")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(|_env: String, query: HashMap<String, String>| {
            let content_type = query.get("content_type").map(String::as_str);
            let items = if content_type == Some("versionTracking") {
                vec![json!({
                    "sys": entry_sys("record", 5),
                    "fields": { "version": { "en-US": "1.1.0" } }
                })]
            } else {
                vec![]
            };
            reply(&json!({ "total": items.len(), "items": items }), StatusCode::OK)
        });

    let update = warp::path!("spaces" / "space1" / "environments" / String / "entries" / String)
        .and(warp::put())
        .and(warp::header::<String>("x-contentful-version"))
        .and(json_body())
        .map(|_env: String, id: String, version: String, body: Value| {
            let saved = json!({
                "sys": entry_sys(&id, version_of(&version) + 1),
                "fields": body["fields"].clone()
            });
            reply(&saved, StatusCode::OK)
        });

    let publish = warp::path!(
        "spaces" / "space1" / "environments" / String / "entries" / String / "published"
    )
    .and(warp::put())
    .and(warp::header::<String>("x-contentful-version"))
    .map(|_env: String, id: String, version: String| {
        let published = json!({
            "sys": entry_sys(&id, version_of(&version) + 1),
            "fields": { "version": { "en-US": "1.2.0" } }
        });
        reply(&published, StatusCode::OK)
    });

    locales.or(list).unify().or(update).unify().or(publish).unify()
}

fn aliases() -> impl Filter<Extract = (Json,), Error = Rejection> + Clone {
    let get = warp::path!("spaces" / "space1" / "environment_aliases" / String)
        .and(warp::get())
        .map(|name: String| {
            let alias = json!({
                "sys": { "id": name, "version": 2 },
                "environment": link("Environment", "master-2024-01-01-0000")
            });
            reply(&alias, StatusCode::OK)
        });

    let update = warp::path!("spaces" / "space1" / "environment_aliases" / String)
        .and(warp::put())
        .and(warp::header::exact("x-contentful-version", "2"))
        .and(json_body())
        .map(|name: String, body: Value| {
            let alias = json!({
                "sys": { "id": name, "version": 3 },
                "environment": body["environment"].clone()
            });
            reply(&alias, StatusCode::OK)
        });

    get.or(update).unify()
}

fn stub() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::header::exact("authorization", "Bearer CFPAT-test")
        .and(spaces().or(keys()).unify().or(entries()).unify().or(aliases()).unify())
}

async fn client() -> ContentfulClient {
    let (addr, server) = warp::serve(stub()).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    ContentfulClient::new(&format!("http://{addr}"), "space1", &Secret::new(TOKEN)).unwrap()
}

#[tokio::test]
async fn test_space_is_fetched() {
    let space = client().await.space().await.unwrap();

    assert_eq!(space.id, "space1");
    assert_eq!(space.name, "Demo");
}

#[tokio::test]
async fn test_environment_status_is_read_from_sys() {
    let client = client().await;

    let master = client.environment(&EnvironmentId::new("master")).await.unwrap();
    assert_eq!(master.status, EnvironmentStatus::Ready);
    assert_eq!(
        client.environment_status(&EnvironmentId::new("master")).await.unwrap(),
        EnvironmentStatus::Ready
    );
}

#[tokio::test]
async fn test_missing_environment_is_not_found() {
    let err = client()
        .await
        .environment(&EnvironmentId::new("GH-gone"))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_server_error_carries_message() {
    let err = client()
        .await
        .environment(&EnvironmentId::new("broken"))
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Status { status: 500, ref message } if message == "boom"));
}

#[tokio::test]
async fn test_environment_is_created_from_source() {
    let created = client()
        .await
        .create_environment(
            &EnvironmentId::new("GH-feature-x"),
            "GH-feature-x",
            Some(EnvironmentId::new("master")),
        )
        .await
        .unwrap();

    assert_eq!(created.id.as_str(), "GH-feature-x");
    assert_eq!(created.status, EnvironmentStatus::Provisioning);
}

#[tokio::test]
async fn test_environment_is_deleted() {
    client()
        .await
        .delete_environment(&EnvironmentId::new("GH-feature-x"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_api_keys_are_read_across_pages() {
    let keys = client().await.api_keys().await.unwrap();

    let ids: Vec<&str> = keys.iter().map(|k| k.id.as_str()).collect();
    assert_eq!(ids, vec!["delivery", "preview"]);
    assert_eq!(keys[1].version, 3);
    assert!(keys[1].links(&EnvironmentId::new("GH-feature-x")));
}

#[tokio::test]
async fn test_api_key_update_sends_version_and_links() {
    let mut key = ApiKey {
        id: "delivery".to_string(),
        name: "delivery key".to_string(),
        description: None,
        environments: vec![EnvironmentLink::alias("master")],
        version: 1,
    };
    key.link(&EnvironmentId::new("GH-feature-x"));

    let saved = client().await.update_api_key(&key).await.unwrap();

    assert_eq!(saved.version, 2);
    assert_eq!(saved.environments, key.environments);
    assert_eq!(saved.environments[0].kind, LinkKind::EnvironmentAlias);
}

#[tokio::test]
async fn test_stale_api_key_version_is_rejected() {
    let key = ApiKey {
        id: "delivery".to_string(),
        name: "delivery key".to_string(),
        description: None,
        environments: vec![],
        version: 7,
    };

    let err = client().await.update_api_key(&key).await.unwrap_err();
    assert!(matches!(err, BackendError::Status { status: 409, .. }));
}

#[tokio::test]
async fn test_default_locale_is_reported() {
    let locales = client()
        .await
        .locales(&EnvironmentId::new("master"))
        .await
        .unwrap();

    let default: Vec<&str> = locales
        .iter()
        .filter(|l| l.default)
        .map(|l| l.code.as_str())
        .collect();
    assert_eq!(default, vec!["en-US"]);
}

#[tokio::test]
async fn test_entries_are_filtered_by_content_type() {
    let client = client().await;
    let env = EnvironmentId::new("master");

    let records = client.entries(&env, "versionTracking").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].localized_str("version", "en-US"), Some("1.1.0"));

    assert!(client.entries(&env, "article").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_entry_update_then_publish_bumps_versions() {
    let client = client().await;
    let env = EnvironmentId::new("master");
    let mut entry = Entry::new("record", "versionTracking", 5);
    entry.set_localized("version", "en-US", "1.2.0");

    let updated = client.update_entry(&env, &entry).await.unwrap();
    assert_eq!(updated.version, 6);
    assert_eq!(updated.localized_str("version", "en-US"), Some("1.2.0"));

    let published = client.publish_entry(&env, &updated).await.unwrap();
    assert_eq!(published.version, 7);
}

#[tokio::test]
async fn test_alias_is_repointed() {
    let client = client().await;

    let current = client.alias("master").await.unwrap();
    assert_eq!(current.environment.as_str(), "master-2024-01-01-0000");

    let saved = client
        .update_alias(&Alias {
            environment: EnvironmentId::new("master-2024-03-05-0907"),
            ..current
        })
        .await
        .unwrap();

    assert_eq!(saved.environment.as_str(), "master-2024-03-05-0907");
    assert_eq!(saved.version, 3);
}
