mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{host, TestApp};
use tenancy_api_rust::tenancy::ResourceKind;

fn usage_of(usage: &Value, resource: &str) -> Value {
    usage
        .as_array()
        .and_then(|entries| entries.iter().find(|e| e["resource"] == resource))
        .cloned()
        .unwrap_or(Value::Null)
}

#[tokio::test]
async fn create_at_limit_is_denied_with_counts() -> Result<()> {
    let app = TestApp::new();

    for i in 0..5 {
        let reply = app.create("acme", "jobs", json!({ "title": format!("Job {}", i) })).await?;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    }

    let reply = app.create("acme", "jobs", json!({ "title": "One too many" })).await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.code(), Some("LIMIT_EXCEEDED"));
    assert_eq!(reply.body["message"], "limit exceeded");
    assert_eq!(reply.body["resource"], "jobs");
    assert_eq!(reply.body["current"], 5);
    assert_eq!(reply.body["max"], 5);
    Ok(())
}

#[tokio::test]
async fn last_free_slot_is_taken_and_counted() -> Result<()> {
    let app = TestApp::new();

    for i in 0..4 {
        app.create("acme", "jobs", json!({ "title": format!("Job {}", i) })).await?;
    }
    let reply = app.get("/api/tenant/usage").host(&host("acme")).send().await?;
    assert_eq!(usage_of(reply.data(), "jobs"), json!({ "resource": "jobs", "current": 4, "max": 5 }));

    let reply = app.create("acme", "jobs", json!({ "title": "Last" })).await?;
    assert_eq!(reply.status, StatusCode::CREATED);

    let reply = app.get("/api/tenant/usage").host(&host("acme")).send().await?;
    assert_eq!(usage_of(reply.data(), "jobs")["current"], 5);
    assert_eq!(usage_of(reply.data(), "polls")["max"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn delete_releases_a_slot() -> Result<()> {
    let app = TestApp::new();

    let mut ids = Vec::new();
    for i in 0..5 {
        let reply = app.create("acme", "jobs", json!({ "title": format!("Job {}", i) })).await?;
        ids.push(reply.data()["id"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(app.create("acme", "jobs", json!({ "title": "x" })).await?.status, StatusCode::FORBIDDEN);

    let reply = app.delete(&format!("/api/data/jobs/{}", ids[0])).host(&host("acme")).send().await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let reply = app.create("acme", "jobs", json!({ "title": "Replacement" })).await?;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    Ok(())
}

#[tokio::test]
async fn failed_insert_does_not_consume_quota() -> Result<()> {
    let app = TestApp::new();

    assert_eq!(app.create("acme", "users", json!({ "email": "a@acme.test" })).await?.status, StatusCode::CREATED);
    assert_eq!(app.create("acme", "users", json!({ "email": "a@acme.test" })).await?.status, StatusCode::CONFLICT);
    assert_eq!(app.create("acme", "users", json!({ "email": "a@acme.test" })).await?.status, StatusCode::CONFLICT);

    let reply = app.get("/api/tenant/usage").host(&host("acme")).send().await?;
    assert_eq!(usage_of(reply.data(), "users")["current"], 1);

    // Limit is 3: two more fit
    assert_eq!(app.create("acme", "users", json!({ "email": "b@acme.test" })).await?.status, StatusCode::CREATED);
    assert_eq!(app.create("acme", "users", json!({ "email": "c@acme.test" })).await?.status, StatusCode::CREATED);
    assert_eq!(app.create("acme", "users", json!({ "email": "d@acme.test" })).await?.status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_concurrent_reservations_for_last_slot() -> Result<()> {
    let app = TestApp::new();
    let acme = app.state.registry.get_by_slug("acme").await?;
    for _ in 0..4 {
        assert!(app.state.limits.check_and_reserve(&acme.id, ResourceKind::Jobs).await?.allowed);
    }

    let (a, b) = tokio::join!(
        app.state.limits.check_and_reserve(&acme.id, ResourceKind::Jobs),
        app.state.limits.check_and_reserve(&acme.id, ResourceKind::Jobs),
    );
    let (a, b) = (a?, b?);

    assert_ne!(a.allowed, b.allowed, "exactly one reservation may succeed");
    let denied = if a.allowed { b } else { a };
    assert_eq!((denied.current, denied.max), (5, Some(5)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_never_overshoot() -> Result<()> {
    let app = Arc::new(TestApp::new());

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                app.create("acme", "users", json!({ "email": format!("u{}@acme.test", i) }))
                    .await
                    .map(|reply| reply.status)
            })
        })
        .collect();

    let mut created = 0;
    let mut denied = 0;
    for task in tasks {
        match task.await?? {
            StatusCode::CREATED => created += 1,
            StatusCode::FORBIDDEN => denied += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!((created, denied), (3, 9));

    let reply = app.get("/api/data/users").host(&host("acme")).send().await?;
    assert_eq!(reply.data().as_array().map(Vec::len), Some(3));
    Ok(())
}

#[tokio::test]
async fn other_tenants_and_kinds_have_independent_counters() -> Result<()> {
    let app = TestApp::new();

    for i in 0..5 {
        app.create("acme", "jobs", json!({ "title": format!("Job {}", i) })).await?;
    }

    // globex has no jobs limit and its own counter
    let reply = app.create("globex", "jobs", json!({ "title": "Unlimited" })).await?;
    assert_eq!(reply.status, StatusCode::CREATED);

    // acme's users counter is untouched by its jobs
    let reply = app.create("acme", "users", json!({ "email": "a@acme.test" })).await?;
    assert_eq!(reply.status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn recount_repairs_drift() -> Result<()> {
    let app = TestApp::new();
    let acme = app.state.registry.get_by_slug("acme").await?;

    for i in 0..2 {
        app.create("acme", "jobs", json!({ "title": format!("Job {}", i) })).await?;
    }
    // Slots counted without a record behind them
    for _ in 0..3 {
        app.state.limits.check_and_reserve(&acme.id, ResourceKind::Jobs).await?;
    }
    assert_eq!(app.create("acme", "jobs", json!({ "title": "x" })).await?.status, StatusCode::FORBIDDEN);

    let reply = app.post("/api/root/tenant/acme/recount").root().send().await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(usage_of(reply.data(), "jobs")["current"], 2);

    assert_eq!(app.create("acme", "jobs", json!({ "title": "y" })).await?.status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn delete_gives_back_exactly_its_slot() -> Result<()> {
    let app = TestApp::new();

    let reply = app.create("acme", "jobs", json!({ "title": "Only" })).await?;
    let id = reply.data()["id"].as_str().unwrap_or_default().to_string();

    let reply = app.delete(&format!("/api/data/jobs/{}", id)).host(&host("acme")).send().await?;
    assert_eq!(reply.status, StatusCode::OK);

    // A second delete of the same id finds nothing and releases nothing
    let reply = app.delete(&format!("/api/data/jobs/{}", id)).host(&host("acme")).send().await?;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = app.get("/api/tenant/usage").host(&host("acme")).send().await?;
    assert_eq!(usage_of(reply.data(), "jobs")["current"], 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recount_racing_creates_leaves_an_exact_counter() -> Result<()> {
    let app = Arc::new(TestApp::new());

    let creates = (0..16).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            app.create("globex", "jobs", json!({ "title": format!("Job {}", i) }))
                .await
                .map(|reply| reply.status)
        })
    });
    let recounts = (0..4).map(|_| {
        let app = app.clone();
        tokio::spawn(async move {
            app.post("/api/root/tenant/globex/recount")
                .root()
                .send()
                .await
                .map(|reply| reply.status)
        })
    });

    let tasks: Vec<_> = creates.chain(recounts).collect();
    for task in tasks {
        let status = task.await??;
        assert!(status == StatusCode::CREATED || status == StatusCode::OK, "unexpected status {}", status);
    }

    let reply = app.get("/api/data/jobs").host(&host("globex")).send().await?;
    assert_eq!(reply.data().as_array().map(Vec::len), Some(16));

    let reply = app.get("/api/tenant/usage").host(&host("globex")).send().await?;
    assert_eq!(usage_of(reply.data(), "jobs")["current"], 16);
    Ok(())
}
