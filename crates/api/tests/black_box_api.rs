use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use platform_api::jwt::Hs256CredentialVerifier;
use platform_api::{AppServices, router};
use platform_auth::{CredentialClaims, RoleName};
use platform_core::{PrincipalId, Tenant, TenantId, TenantStatus};
use platform_infra::{InMemoryStore, PrincipalDirectory, PrincipalRecord, RbacStore, seed_builtin_catalog};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    store: Arc<InMemoryStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Same router as prod over a seeded in-memory store, on an ephemeral port.
    async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        seed_builtin_catalog(store.as_ref()).await.unwrap();

        let verifier = Arc::new(Hs256CredentialVerifier::new(JWT_SECRET.as_bytes()));
        let app = router(Arc::new(AppServices::from_store(store.clone(), verifier)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, store, handle }
    }

    async fn tenant(&self) -> TenantId {
        let tenant = Tenant::new(TenantId::new(), "acme", TenantStatus::Active);
        self.store.insert_tenant(tenant).await.unwrap().id
    }

    async fn principal(&self, role: &'static str, tenant_id: Option<TenantId>, active: bool) -> PrincipalId {
        let role = self
            .store
            .find_role(&RoleName::from_static(role))
            .await
            .unwrap()
            .expect("builtin role");
        let mut record = PrincipalRecord::new(tenant_id, format!("{}@example.test", PrincipalId::new()), role.id);
        record.is_active = active;
        self.store.insert_principal(record).await.unwrap().id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, sub: PrincipalId) -> String {
    let now = Utc::now();
    let claims = CredentialClaims {
        sub: Some(sub.to_string()),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_principal() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(srv.url("/whoami")).bearer_auth("garbage").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credential");

    let forged = mint_jwt("other-secret", PrincipalId::new());
    let res = client.get(srv.url("/whoami")).bearer_auth(forged).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let unknown = mint_jwt(JWT_SECRET, PrincipalId::new());
    let res = client.get(srv.url("/whoami")).bearer_auth(unknown).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "principal_not_found");
}

#[tokio::test]
async fn inactive_principal_is_forbidden() {
    let srv = TestServer::spawn().await;
    let tenant = srv.tenant().await;
    let id = srv.principal("TENANT_ADMIN", Some(tenant), false).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(JWT_SECRET, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "principal_inactive");
}

#[tokio::test]
async fn whoami_reports_tenant_role_and_permissions_from_the_store() {
    let srv = TestServer::spawn().await;
    let tenant = srv.tenant().await;
    let id = srv.principal("VIEWER", Some(tenant), true).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(JWT_SECRET, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant.to_string());
    assert_eq!(body["role"]["name"], "VIEWER");
    assert_eq!(body["global_scope"], false);
    let permissions = body["permissions"].as_array().unwrap();
    assert!(permissions.iter().any(|p| p == "view_projects"));
    assert!(!permissions.iter().any(|p| p == "create_projects"));
}

#[tokio::test]
async fn records_are_stamped_and_isolated_per_tenant() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let home = srv.tenant().await;
    let other = srv.tenant().await;
    let admin = mint_jwt(JWT_SECRET, srv.principal("TENANT_ADMIN", Some(home), true).await);
    let foreign_admin = mint_jwt(JWT_SECRET, srv.principal("TENANT_ADMIN", Some(other), true).await);
    let viewer = mint_jwt(JWT_SECRET, srv.principal("VIEWER", Some(home), true).await);

    // A supplied foreign tenant is overwritten with the caller's own.
    let res = client
        .post(srv.url("/crud/projects"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "Apollo", "tenant_id": other.to_string() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["tenant_id"].as_str().unwrap(), home.to_string());
    assert_eq!(created["name"], "Apollo");
    let id = created["id"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url(&format!("/crud/projects/{id}")))
        .bearer_auth(&viewer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url(&format!("/crud/projects/{id}")))
        .bearer_auth(&foreign_admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .delete(srv.url(&format!("/crud/projects/{id}")))
        .bearer_auth(&foreign_admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/crud/projects?name=Apollo"))
        .bearer_auth(&foreign_admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: serde_json::Value = res.json().await.unwrap();
    assert!(listed.as_array().unwrap().is_empty());

    let res = client
        .post(srv.url("/crud/projects"))
        .bearer_auth(&viewer)
        .json(&json!({ "name": "Gemini" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/crud/spaceships"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn global_scope_caller_may_target_any_tenant() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let home = srv.tenant().await;
    let target = srv.tenant().await;
    let root = mint_jwt(JWT_SECRET, srv.principal("SUPER_ADMIN", Some(home), true).await);

    let res = client
        .post(srv.url("/crud/projects"))
        .bearer_auth(&root)
        .json(&json!({ "name": "Hermes", "tenant_id": target.to_string() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["tenant_id"].as_str().unwrap(), target.to_string());
}

#[tokio::test]
async fn role_administration_round_trip() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let tenant = srv.tenant().await;
    let root = mint_jwt(JWT_SECRET, srv.principal("SUPER_ADMIN", None, true).await);
    let admin = mint_jwt(JWT_SECRET, srv.principal("TENANT_ADMIN", Some(tenant), true).await);

    // Tenant admins can read the registry but not change it.
    let res = client.get(srv.url("/rbac/roles")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client
        .post(srv.url("/rbac/roles"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "AUDITOR", "display_name": "Auditor", "description": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/rbac/roles"))
        .bearer_auth(&root)
        .json(&json!({ "name": "AUDITOR", "display_name": "Auditor", "description": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let role: serde_json::Value = res.json().await.unwrap();
    let role_id = role["id"].as_str().unwrap().to_string();
    assert_eq!(role["permissions"], json!([]));

    let set = json!({ "permissions": ["view_users", "view_projects"] });
    for _ in 0..2 {
        let res = client
            .put(srv.url(&format!("/rbac/roles/{role_id}/permissions")))
            .bearer_auth(&root)
            .json(&set)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client
        .get(srv.url(&format!("/rbac/roles/{role_id}/permissions")))
        .bearer_auth(&root)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["permissions"], json!(["view_projects", "view_users"]));

    let res = client
        .put(srv.url(&format!("/rbac/roles/{role_id}/permissions")))
        .bearer_auth(&root)
        .json(&json!({ "permissions": ["launch_rockets"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .delete(srv.url(&format!("/rbac/roles/{role_id}")))
        .bearer_auth(&root)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(srv.url(&format!("/rbac/roles/{role_id}")))
        .bearer_auth(&root)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // TENANT_ADMIN is held by `admin`.
    let tenant_admin = srv
        .store
        .find_role(&RoleName::from_static("TENANT_ADMIN"))
        .await
        .unwrap()
        .unwrap();
    let res = client
        .delete(srv.url(&format!("/rbac/roles/{}", tenant_admin.id)))
        .bearer_auth(&root)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "role_in_use");
}

#[tokio::test]
async fn explain_reports_denial_for_the_caller() {
    let srv = TestServer::spawn().await;
    let tenant = srv.tenant().await;
    let admin = mint_jwt(JWT_SECRET, srv.principal("TENANT_ADMIN", Some(tenant), true).await);

    let res = reqwest::Client::new()
        .get(srv.url("/rbac/explain?permission=manage_tenants"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["granted"], false);
    assert_eq!(body["required_permission"], "manage_tenants");
}

#[tokio::test]
async fn only_global_callers_hand_out_the_global_role() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let tenant = srv.tenant().await;
    let admin = mint_jwt(JWT_SECRET, srv.principal("TENANT_ADMIN", Some(tenant), true).await);
    let member = srv.principal("USER", Some(tenant), true).await;
    let super_admin = srv
        .store
        .find_role(&RoleName::from_static("SUPER_ADMIN"))
        .await
        .unwrap()
        .unwrap();

    let res = client
        .patch(srv.url(&format!("/users/{member}")))
        .bearer_auth(&admin)
        .json(&json!({ "role_id": super_admin.id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .patch(srv.url(&format!("/users/{member}")))
        .bearer_auth(&admin)
        .json(&json!({ "is_active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["is_active"], false);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(JWT_SECRET, member))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tenant_admin_lists_counts_and_deletes_own_users_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let tenant = srv.tenant().await;
    let other = srv.tenant().await;
    let admin_id = srv.principal("TENANT_ADMIN", Some(tenant), true).await;
    let admin = mint_jwt(JWT_SECRET, admin_id);
    let member = srv.principal("USER", Some(tenant), true).await;
    let root = srv.principal("SUPER_ADMIN", Some(tenant), true).await;
    let foreign = srv.principal("USER", Some(other), true).await;

    let res = client.get(srv.url("/users?limit=10")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["limit"], 10);
    let ids: Vec<String> = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&admin_id.to_string()));
    assert!(ids.contains(&member.to_string()));

    let res = client.get(srv.url("/users/count")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["count"], 2);

    for target in [foreign, root] {
        let res = client
            .delete(srv.url(&format!("/users/{target}")))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    let res = client
        .delete(srv.url(&format!("/users/{member}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(srv.url(&format!("/users/{member}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
