mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{host, TestApp};

async fn id_of(app: &TestApp, slug: &str) -> Result<String> {
    Ok(app.state.registry.get_by_slug(slug).await?.id.to_string())
}

#[tokio::test]
async fn listing_never_returns_other_tenants_records() -> Result<()> {
    let app = TestApp::new();
    let globex_id = id_of(&app, "globex").await?;

    app.create("acme", "users", json!({ "email": "wile@acme.test" })).await?;
    app.create("acme", "users", json!({ "email": "road@acme.test" })).await?;
    app.create("globex", "users", json!({ "email": "hank@globex.test" })).await?;

    let reply = app.get("/api/data/users").host(&host("globex")).send().await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let rows = reply.data().as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 1);
    assert!(rows.iter().all(|r| r["tenant_id"] == globex_id.as_str()));
    Ok(())
}

#[tokio::test]
async fn body_tenant_id_is_never_trusted() -> Result<()> {
    let app = TestApp::new();
    let acme_id = id_of(&app, "acme").await?;
    let globex_id = id_of(&app, "globex").await?;

    let reply = app
        .create("acme", "users", json!({ "email": "sneaky@acme.test", "tenant_id": globex_id }))
        .await?;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    assert_eq!(reply.data()["tenant_id"], acme_id.as_str());

    let reply = app.get("/api/data/users").host(&host("globex")).send().await?;
    assert_eq!(reply.data().as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn other_tenants_record_is_not_found() -> Result<()> {
    let app = TestApp::new();

    let created = app.create("acme", "users", json!({ "email": "wile@acme.test" })).await?;
    let id = created.data()["id"].as_str().unwrap_or_default().to_string();

    let reply = app.get(&format!("/api/data/users/{}", id)).host(&host("globex")).send().await?;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = app.delete(&format!("/api/data/users/{}", id)).host(&host("globex")).send().await?;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = app.get(&format!("/api/data/users/{}", id)).host(&host("acme")).send().await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.data()["email"], "wile@acme.test");
    Ok(())
}

#[tokio::test]
async fn unique_fields_are_scoped_per_tenant() -> Result<()> {
    let app = TestApp::new();

    let reply = app.create("acme", "users", json!({ "email": "same@mail.test" })).await?;
    assert_eq!(reply.status, StatusCode::CREATED);

    let reply = app.create("globex", "users", json!({ "email": "same@mail.test" })).await?;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);

    let reply = app.create("acme", "users", json!({ "email": "same@mail.test" })).await?;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn populate_cannot_reach_into_another_tenant() -> Result<()> {
    let app = TestApp::new();

    let ours = app.create("acme", "users", json!({ "email": "boss@acme.test" })).await?;
    let theirs = app.create("globex", "users", json!({ "email": "hank@globex.test" })).await?;
    let our_user = ours.data()["id"].clone();
    let their_user = theirs.data()["id"].clone();

    let honest = app
        .create("acme", "jobs", json!({ "title": "Engineer", "posted_by": our_user }))
        .await?;
    let forged = app
        .create("acme", "jobs", json!({ "title": "Spy", "posted_by": their_user }))
        .await?;
    assert_eq!(forged.status, StatusCode::CREATED, "{}", forged.body);

    let reply = app
        .get(&format!("/api/data/jobs/{}?populate=posted_by", honest.data()["id"].as_str().unwrap_or_default()))
        .host(&host("acme"))
        .send()
        .await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.data()["posted_by"]["email"], "boss@acme.test");

    let reply = app
        .get(&format!("/api/data/jobs/{}?populate=posted_by", forged.data()["id"].as_str().unwrap_or_default()))
        .host(&host("acme"))
        .send()
        .await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.data()["posted_by"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn populate_drops_foreign_members_from_arrays() -> Result<()> {
    let app = TestApp::new();

    let ours = app.create("acme", "users", json!({ "email": "a@acme.test" })).await?;
    let theirs = app.create("globex", "users", json!({ "email": "h@globex.test" })).await?;

    app.create(
        "acme",
        "groups",
        json!({ "name": "Team", "members": [ours.data()["id"], theirs.data()["id"]] }),
    )
    .await?;

    let reply = app
        .post("/api/find/groups")
        .host(&host("acme"))
        .json(json!({ "where": { "name": "Team" }, "populate": ["members"] }))
        .send()
        .await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let members = reply.data()[0]["members"].as_array().cloned().unwrap_or_default();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["email"], "a@acme.test");
    Ok(())
}

#[tokio::test]
async fn tenant_column_cannot_be_filtered_on() -> Result<()> {
    let app = TestApp::new();
    let globex_id = id_of(&app, "globex").await?;

    let reply = app
        .post("/api/find/users")
        .host(&host("acme"))
        .json(json!({ "where": { "tenant_id": globex_id } }))
        .send()
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = app
        .post("/api/find/users")
        .host(&host("acme"))
        .json(json!({ "where": { "$or": [ { "email": "x" }, { "tenant_id": globex_id } ] } }))
        .send()
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn list_accepts_where_order_and_paging() -> Result<()> {
    let app = TestApp::new();

    for (email, age) in [("c@acme.test", 30), ("a@acme.test", 20), ("b@acme.test", 40)] {
        app.create("acme", "users", json!({ "email": email, "age": age })).await?;
    }

    let reply = app
        .get("/api/data/users?where=%7B%22age%22%3A%7B%22%24gte%22%3A25%7D%7D&order=email%20desc&limit=1")
        .host(&host("acme"))
        .send()
        .await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let rows = reply.data().as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["email"], "c@acme.test");
    Ok(())
}

#[tokio::test]
async fn unknown_resource_and_relation_are_rejected() -> Result<()> {
    let app = TestApp::new();

    let reply = app.get("/api/data/widgets").host(&host("acme")).send().await?;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = app.get("/api/data/users?populate=manager").host(&host("acme")).send().await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    Ok(())
}
