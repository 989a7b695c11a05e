//! velro-core demo binary.
//!
//! Wires the library's in-memory reference implementations into a small
//! `axum` surface so the Request Pipeline Gate can be exercised by hand
//! during local development. This binary is not normative: production
//! deployments construct [`velro_core::gate::PipelineGate`] themselves,
//! backed by a real identity provider, relational store, Redis-backed L2,
//! and storage URL signer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use velro_core::audit::AuditPipeline;
use velro_core::auth::AuthorizationCore;
use velro_core::cache::GenerationRegistry;
use velro_core::config::CoreConfig;
use velro_core::domain::access::AccessType;
use velro_core::domain::principal::PrincipalId;
use velro_core::domain::resource::{ResourceId, ResourceRef, ResourceType};
use velro_core::domain::security_context::SecurityContext;
use velro_core::error::CoreResult;
use velro_core::external::audit_sinks::InMemoryAuditBackend;
use velro_core::external::cache_store::InMemorySharedStore;
use velro_core::external::signer::HmacUrlSigner;
use velro_core::external::ssrf::SsrfGuard;
use velro_core::external::store::{
    GenerationParent, Page, PersistentStore, ProjectRecord, ResourceRecord, TeamLink,
};
use velro_core::gate::{GateRequest, HttpMethod, PipelineGate};

/// In-memory stand-in for the relational store. Every query
/// returns "not found" — enough for direct-ownership and public-visibility
/// scenarios, which carry all the data they need inline on the request's
/// `ResourceRef`. A real deployment supplies a `sqlx`-backed implementation
/// behind the `postgres-store` feature instead.
#[derive(Default)]
struct DemoStore;

#[async_trait::async_trait]
impl PersistentStore for DemoStore {
    async fn fetch_resource(&self, _id: ResourceId) -> CoreResult<Option<ResourceRecord>> {
        Ok(None)
    }

    async fn fetch_project(
        &self,
        _id: velro_core::domain::resource::ProjectId,
    ) -> CoreResult<Option<ProjectRecord>> {
        Ok(None)
    }

    async fn fetch_team_memberships(
        &self,
        _principal: PrincipalId,
    ) -> CoreResult<Vec<(velro_core::domain::principal::TeamId, velro_core::domain::role::Role)>> {
        Ok(Vec::new())
    }

    async fn fetch_team_project_links(
        &self,
        _project: velro_core::domain::resource::ProjectId,
    ) -> CoreResult<Vec<TeamLink>> {
        Ok(Vec::new())
    }

    async fn fetch_generation_parent(
        &self,
        _id: velro_core::domain::resource::GenerationId,
    ) -> CoreResult<GenerationParent> {
        Ok(GenerationParent { parent_id: None })
    }

    async fn fetch_recent_generations(
        &self,
        _principal: PrincipalId,
        _limit: usize,
        _cursor: Option<String>,
    ) -> CoreResult<Page<velro_core::domain::resource::GenerationId>> {
        Ok(Page {
            items: Vec::new(),
            next_cursor: None,
        })
    }
}

#[derive(Clone)]
struct AppState {
    gate: Arc<PipelineGate>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeBody {
    principal_id: uuid::Uuid,
    resource_id: uuid::Uuid,
    owner_id: uuid::Uuid,
    resource_type: String,
    access: String,
    client_ip: std::net::IpAddr,
    user_agent: String,
}

#[derive(Debug, Serialize)]
struct AuthorizeReply {
    granted: bool,
    threat_level: String,
    cache_hit: bool,
    system_used: &'static str,
    denial_reason: Option<String>,
}

fn resource_type_from_str(s: &str) -> ResourceType {
    match s {
        "project" => ResourceType::Project,
        "team" => ResourceType::Team,
        "user_profile" => ResourceType::UserProfile,
        "admin_resource" => ResourceType::AdminResource,
        "system_resource" => ResourceType::SystemResource,
        _ => ResourceType::Generation,
    }
}

fn access_from_str(s: &str) -> AccessType {
    match s {
        "write" => AccessType::Write,
        "delete" => AccessType::Delete,
        "share" => AccessType::Share,
        "admin" => AccessType::Admin,
        _ => AccessType::Read,
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn authorize(
    State(state): State<AppState>,
    Json(body): Json<AuthorizeBody>,
) -> Json<AuthorizeReply> {
    let principal = PrincipalId::new(body.principal_id);
    let owner = PrincipalId::new(body.owner_id);
    let kind = resource_type_from_str(&body.resource_type);
    let resource = ResourceRef::new(ResourceId(body.resource_id), kind, owner);
    let context = SecurityContext::new(body.client_ip, body.user_agent);
    let request = velro_core::domain::authorization::AuthorizationRequest::new(
        principal,
        resource,
        kind,
        access_from_str(&body.access),
        context,
    );

    let gate_request = GateRequest {
        path: "/api/authorize".to_string(),
        method: HttpMethod::Post,
        body: None,
        authorization: request,
    };

    let response = state.gate.process(gate_request).await;

    Json(AuthorizeReply {
        granted: response.authorization.granted,
        threat_level: format!("{:?}", response.authorization.threat_level),
        cache_hit: response.authorization.cache_hit,
        system_used: response.authorization.system_used,
        denial_reason: response.authorization.denial_reason,
    })
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/authorize", post(authorize))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = velro_core::VERSION, "starting velro-core demo server");

    let config = Arc::new(CoreConfig::from_env());

    let l2 = Arc::new(InMemorySharedStore::new());
    let generations = Arc::new(GenerationRegistry::new());
    let ssrf_guard = SsrfGuard::new(vec!["storage.velro.internal".to_string()]);
    let signer = Arc::new(HmacUrlSigner::new(
        "https://storage.velro.internal",
        std::env::var("MEDIA_SIGNING_SECRET")
            .unwrap_or_else(|_| "dev-only-secret".to_string())
            .into_bytes(),
        ssrf_guard,
    ));

    let audit_backend = Arc::new(InMemoryAuditBackend::new());
    let audit = Arc::new(AuditPipeline::new(
        l2.clone(),
        audit_backend.clone(),
        audit_backend,
    ));

    let core = Arc::new(AuthorizationCore::new(
        config.clone(),
        Arc::new(DemoStore::default()),
        l2,
        generations,
        signer,
        vec!["storage.velro.internal".to_string()],
        audit,
    ));

    let gate = Arc::new(PipelineGate::new(config, core));
    let state = AppState { gate };

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
