use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{extract_detail, ApiError};
use crate::models::{
    Application, ApplicationQuery, ApplicationUpdate, Lead, LeadQuery, LeadUpdate, MatchAnalysis,
    NewApplication, NewLead, NewResume, Promotion, Resume, ResumeUpdate, StageHistoryEntry,
};

/// The backend's 404 detail when no resume is active. Any other 404 on that
/// route (a wrong base URL, say) is a real failure.
pub const NO_ACTIVE_RESUME_DETAIL: &str = "No active resume found";

// --- Gateway trait ---

/// One method per (resource, verb) pair exposed by the tracker backend.
///
/// Every call is a single attempt. The backend owns ids, timestamps, stage
/// history and the single-active-resume rule; callers only send intent.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    async fn list_resumes(&self) -> Result<Vec<Resume>, ApiError>;
    /// `None` when no resume is active.
    async fn active_resume(&self) -> Result<Option<Resume>, ApiError>;
    async fn get_resume(&self, id: i64) -> Result<Resume, ApiError>;
    async fn create_resume(&self, resume: &NewResume) -> Result<Resume, ApiError>;
    async fn update_resume(&self, id: i64, update: &ResumeUpdate) -> Result<Resume, ApiError>;
    async fn delete_resume(&self, id: i64) -> Result<(), ApiError>;

    async fn list_applications(&self, query: &ApplicationQuery) -> Result<Vec<Application>, ApiError>;
    async fn get_application(&self, id: i64) -> Result<Application, ApiError>;
    async fn create_application(&self, application: &NewApplication) -> Result<Application, ApiError>;
    async fn update_application(
        &self,
        id: i64,
        update: &ApplicationUpdate,
    ) -> Result<Application, ApiError>;
    async fn delete_application(&self, id: i64) -> Result<(), ApiError>;
    async fn application_history(&self, id: i64) -> Result<Vec<StageHistoryEntry>, ApiError>;

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, ApiError>;
    async fn get_lead(&self, id: i64) -> Result<Lead, ApiError>;
    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, ApiError>;
    async fn update_lead(&self, id: i64, update: &LeadUpdate) -> Result<Lead, ApiError>;
    async fn delete_lead(&self, id: i64) -> Result<(), ApiError>;
    /// Omitting `resume_id` lets the backend use the active resume.
    async fn analyze_lead(&self, id: i64, resume_id: Option<i64>) -> Result<MatchAnalysis, ApiError>;
    async fn promote_lead(&self, id: i64) -> Result<Promotion, ApiError>;
}

// --- HTTP implementation ---

#[derive(Debug, Clone)]
pub struct HttpTracker {
    base_url: String,
    client: Client,
}

impl HttpTracker {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, method: &Method, path: &str, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            warn!(%method, path, error = %e, "tracker unreachable");
            ApiError::Transport(e)
        })?;

        let status = response.status();
        debug!(%method, path, status = status.as_u16(), "tracker responded");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body);
        warn!(%method, path, status = status.as_u16(), detail = detail.as_deref().unwrap_or("-"), "tracker rejected request");
        Err(ApiError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, path: &str, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(&method, path, request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{method} {path}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(Method::GET, path, self.request(Method::GET, path)).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(&Method::DELETE, path, self.request(Method::DELETE, path))
            .await
            .map(|_| ())
    }
}

fn paging(params: &mut Vec<(&'static str, String)>, skip: Option<u32>, limit: Option<u32>) {
    if let Some(skip) = skip {
        params.push(("skip", skip.to_string()));
    }
    if let Some(limit) = limit {
        params.push(("limit", limit.to_string()));
    }
}

fn application_params(query: &ApplicationQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(stage) = query.stage {
        params.push(("stage", stage.as_str().to_string()));
    }
    if let Some(company) = &query.company {
        params.push(("company", company.clone()));
    }
    paging(&mut params, query.skip, query.limit);
    params
}

fn lead_params(query: &LeadQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("sort_by_match", query.sort_by_match.to_string())];
    if let Some(company) = &query.company {
        params.push(("company", company.clone()));
    }
    if let Some(promoted) = query.promoted {
        params.push(("promoted", promoted.to_string()));
    }
    paging(&mut params, query.skip, query.limit);
    params
}

#[async_trait]
impl TrackerApi for HttpTracker {
    async fn list_resumes(&self) -> Result<Vec<Resume>, ApiError> {
        self.get("/api/resumes").await
    }

    async fn active_resume(&self) -> Result<Option<Resume>, ApiError> {
        match self.get("/api/resumes/active").await {
            Ok(resume) => Ok(Some(resume)),
            Err(ApiError::Rejected {
                status: 404,
                detail: Some(detail),
            }) if detail == NO_ACTIVE_RESUME_DETAIL => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_resume(&self, id: i64) -> Result<Resume, ApiError> {
        self.get(&format!("/api/resumes/{id}")).await
    }

    async fn create_resume(&self, resume: &NewResume) -> Result<Resume, ApiError> {
        let path = "/api/resumes";
        self.call(Method::POST, path, self.request(Method::POST, path).json(resume))
            .await
    }

    async fn update_resume(&self, id: i64, update: &ResumeUpdate) -> Result<Resume, ApiError> {
        let path = format!("/api/resumes/{id}");
        self.call(Method::PUT, &path, self.request(Method::PUT, &path).json(update))
            .await
    }

    async fn delete_resume(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/api/resumes/{id}")).await
    }

    async fn list_applications(&self, query: &ApplicationQuery) -> Result<Vec<Application>, ApiError> {
        let path = "/api/applications";
        let request = self
            .request(Method::GET, path)
            .query(&application_params(query));
        self.call(Method::GET, path, request).await
    }

    async fn get_application(&self, id: i64) -> Result<Application, ApiError> {
        self.get(&format!("/api/applications/{id}")).await
    }

    async fn create_application(&self, application: &NewApplication) -> Result<Application, ApiError> {
        let path = "/api/applications";
        self.call(Method::POST, path, self.request(Method::POST, path).json(application))
            .await
    }

    async fn update_application(
        &self,
        id: i64,
        update: &ApplicationUpdate,
    ) -> Result<Application, ApiError> {
        let path = format!("/api/applications/{id}");
        self.call(Method::PUT, &path, self.request(Method::PUT, &path).json(update))
            .await
    }

    async fn delete_application(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/api/applications/{id}")).await
    }

    async fn application_history(&self, id: i64) -> Result<Vec<StageHistoryEntry>, ApiError> {
        self.get(&format!("/api/applications/{id}/history")).await
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, ApiError> {
        let path = "/api/leads";
        let request = self.request(Method::GET, path).query(&lead_params(query));
        self.call(Method::GET, path, request).await
    }

    async fn get_lead(&self, id: i64) -> Result<Lead, ApiError> {
        self.get(&format!("/api/leads/{id}")).await
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, ApiError> {
        let path = "/api/leads";
        self.call(Method::POST, path, self.request(Method::POST, path).json(lead))
            .await
    }

    async fn update_lead(&self, id: i64, update: &LeadUpdate) -> Result<Lead, ApiError> {
        let path = format!("/api/leads/{id}");
        self.call(Method::PUT, &path, self.request(Method::PUT, &path).json(update))
            .await
    }

    async fn delete_lead(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/api/leads/{id}")).await
    }

    async fn analyze_lead(&self, id: i64, resume_id: Option<i64>) -> Result<MatchAnalysis, ApiError> {
        let path = format!("/api/leads/{id}/analyze");
        let mut request = self.request(Method::POST, &path);
        if let Some(resume_id) = resume_id {
            request = request.query(&[("resume_id", resume_id)]);
        }
        self.call(Method::POST, &path, request).await
    }

    async fn promote_lead(&self, id: i64) -> Result<Promotion, ApiError> {
        let path = format!("/api/leads/{id}/promote");
        self.call(Method::POST, &path, self.request(Method::POST, &path))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn serve(router: Router) -> HttpTracker {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        HttpTracker::new(&format!("http://{addr}/"))
    }

    fn lead_json(id: i64, params: &HashMap<String, String>) -> Value {
        json!({
            "id": id,
            "company_name": "Acme",
            "role_name": "Engineer",
            "job_ad_content": params.get("sort_by_match").cloned().unwrap_or_default(),
            "job_url": null,
            "match_percentage": null,
            "match_reasoning": null,
            "is_promoted": false,
            "created_at": "2024-03-01T10:00:00"
        })
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        assert_eq!(HttpTracker::new("http://localhost:8000/").base_url(), "http://localhost:8000");
    }

    #[test]
    fn lead_params_always_carry_sort_flag() {
        let params = lead_params(&LeadQuery::default());
        assert_eq!(params, vec![("sort_by_match", "false".to_string())]);

        let params = lead_params(&LeadQuery {
            sort_by_match: true,
            promoted: Some(false),
            limit: Some(20),
            ..Default::default()
        });
        assert_eq!(
            params,
            vec![
                ("sort_by_match", "true".to_string()),
                ("promoted", "false".to_string()),
                ("limit", "20".to_string()),
            ]
        );
    }

    #[test]
    fn application_params_omit_unset_filters() {
        assert!(application_params(&ApplicationQuery::default()).is_empty());
        let params = application_params(&ApplicationQuery {
            stage: Some(Stage::Offer),
            ..Default::default()
        });
        assert_eq!(params, vec![("stage", "offer".to_string())]);
    }

    #[tokio::test]
    async fn list_leads_sends_sort_flag() {
        let router = Router::new().route(
            "/api/leads",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                Json(json!([lead_json(1, &params)]))
            }),
        );
        let api = serve(router).await;

        let leads = api
            .list_leads(&LeadQuery {
                sort_by_match: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(leads.len(), 1);
        // the handler echoes the flag it received into job_ad_content
        assert_eq!(leads[0].job_ad_content, "true");
    }

    #[tokio::test]
    async fn analyze_passes_optional_resume_id() {
        let router = Router::new().route(
            "/api/leads/:id/analyze",
            post(
                |Path(id): Path<i64>, Query(params): Query<HashMap<String, String>>| async move {
                    let resume = params.get("resume_id").cloned().unwrap_or_else(|| "active".into());
                    Json(json!({
                        "match_percentage": 81.0,
                        "reasoning": format!("lead {id} vs resume {resume}")
                    }))
                },
            ),
        );
        let api = serve(router).await;

        let analysis = api.analyze_lead(3, Some(9)).await.unwrap();
        assert_eq!(analysis.match_percentage, 81.0);
        assert_eq!(analysis.reasoning, "lead 3 vs resume 9");

        let analysis = api.analyze_lead(3, None).await.unwrap();
        assert_eq!(analysis.reasoning, "lead 3 vs resume active");
    }

    #[tokio::test]
    async fn rejection_carries_server_detail() {
        let router = Router::new().route(
            "/api/applications/:id",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "detail": "Job application not found" })),
                )
            }),
        );
        let api = serve(router).await;

        match api.get_application(42).await {
            Err(ApiError::Rejected { status, detail }) => {
                assert_eq!(status, 404);
                assert_eq!(detail.as_deref(), Some("Job application not found"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_active_resume_is_none() {
        let router = Router::new().route(
            "/api/resumes/active",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "detail": "No active resume found" })),
                )
            }),
        );
        let api = serve(router).await;
        assert_eq!(api.active_resume().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unrelated_404_on_active_resume_is_an_error() {
        // nothing routed: axum answers 404 with no detail, as a wrong base URL would
        let api = serve(Router::new()).await;
        match api.active_resume().await {
            Err(ApiError::Rejected { status, detail }) => {
                assert_eq!(status, 404);
                assert_eq!(detail, None);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    fn application_json(id: i64, stage: &str) -> Value {
        json!({
            "id": id,
            "company_name": "Acme",
            "role_name": "Engineer",
            "stage": stage,
            "job_ad_content": null,
            "cover_letter": null,
            "application_notes": null,
            "notes": null,
            "match_percentage": null,
            "created_at": "2024-03-01T10:00:00",
            "updated_at": "2024-03-01T10:00:00"
        })
    }

    #[tokio::test]
    async fn creates_post_to_collection_routes() {
        let router = Router::new()
            .route(
                "/api/applications",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["stage"], "applied");
                    assert_eq!(body["match_percentage"], Value::Null);
                    Json(application_json(1, "applied"))
                }),
            )
            .route(
                "/api/leads",
                post(|Json(body): Json<Value>| async move {
                    let mut lead = lead_json(2, &HashMap::new());
                    lead["job_ad_content"] = body["job_ad_content"].clone();
                    Json(lead)
                }),
            )
            .route(
                "/api/resumes",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "id": 3,
                        "content": body["content"],
                        "file_name": body["file_name"],
                        "is_active": true,
                        "created_at": "2024-03-01T10:00:00"
                    }))
                }),
            );
        let api = serve(router).await;

        let app = api
            .create_application(&NewApplication {
                company_name: "Acme".into(),
                role_name: "Engineer".into(),
                stage: Stage::Applied,
                job_ad_content: None,
                cover_letter: None,
                application_notes: None,
                notes: None,
                match_percentage: None,
            })
            .await
            .unwrap();
        assert_eq!((app.id, app.stage), (1, Stage::Applied));

        let lead = api
            .create_lead(&NewLead {
                company_name: "Acme".into(),
                role_name: "Engineer".into(),
                job_ad_content: "Rust backend role".into(),
                job_url: None,
            })
            .await
            .unwrap();
        assert_eq!(lead.job_ad_content, "Rust backend role");

        let resume = api
            .create_resume(&NewResume {
                content: "Rust, Go".into(),
                file_name: Some("cv.txt".into()),
            })
            .await
            .unwrap();
        assert_eq!(resume.file_name.as_deref(), Some("cv.txt"));
    }

    #[tokio::test]
    async fn deletes_use_delete_on_item_routes() {
        let router = Router::new()
            .route("/api/leads/:id", delete(|Path(id): Path<i64>| async move {
                assert_eq!(id, 4);
                StatusCode::NO_CONTENT
            }))
            .route("/api/applications/:id", delete(|| async {
                Json(json!({ "message": "Job application deleted successfully" }))
            }))
            .route("/api/resumes/:id", delete(|| async { StatusCode::NO_CONTENT }));
        let api = serve(router).await;

        api.delete_lead(4).await.unwrap();
        api.delete_application(5).await.unwrap();
        api.delete_resume(6).await.unwrap();
    }

    #[tokio::test]
    async fn history_decodes_initial_row() {
        let router = Router::new().route(
            "/api/applications/:id/history",
            get(|Path(id): Path<i64>| async move {
                Json(json!([
                    {
                        "id": 10,
                        "application_id": id,
                        "previous_stage": null,
                        "new_stage": "not_started",
                        "changed_at": "2024-03-01T10:00:00"
                    },
                    {
                        "id": 11,
                        "application_id": id,
                        "previous_stage": "not_started",
                        "new_stage": "applied",
                        "changed_at": "2024-03-02T10:00:00"
                    }
                ]))
            }),
        );
        let api = serve(router).await;

        let history = api.application_history(7).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].previous_stage, None);
        assert_eq!(history[0].new_stage, Stage::NotStarted);
        assert_eq!(history[1].previous_stage, Some(Stage::NotStarted));
    }

    #[tokio::test]
    async fn promote_posts_and_decodes_application() {
        let router = Router::new().route(
            "/api/leads/:id/promote",
            post(|Path(id): Path<i64>| async move {
                assert_eq!(id, 8);
                Json(json!({
                    "job_application": application_json(21, "not_started"),
                    "message": "Lead successfully promoted to job application"
                }))
            }),
        );
        let api = serve(router).await;

        let promotion = api.promote_lead(8).await.unwrap();
        assert_eq!(promotion.job_application.id, 21);
        assert_eq!(promotion.job_application.stage, Stage::NotStarted);
        assert!(promotion.message.contains("promoted"));
    }

    #[tokio::test]
    async fn list_applications_sends_stage_filter() {
        let router = Router::new().route(
            "/api/applications",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                match params.get("stage").map(String::as_str) {
                    Some("offer") => Json(json!([application_json(1, "offer")])),
                    _ => Json(json!([])),
                }
            }),
        );
        let api = serve(router).await;

        let offers = api
            .list_applications(&ApplicationQuery {
                stage: Some(Stage::Offer),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].stage, Stage::Offer);

        let all = api.list_applications(&ApplicationQuery::default()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn unexpected_body_is_a_decode_error() {
        let router = Router::new().route("/api/resumes", get(|| async { "not json" }));
        let api = serve(router).await;
        assert!(matches!(api.list_resumes().await, Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = HttpTracker::new(&format!("http://{addr}"));
        assert!(matches!(api.list_resumes().await, Err(ApiError::Transport(_))));
    }

    #[tokio::test]
    async fn update_sends_only_set_fields() {
        let router = Router::new().route(
            "/api/resumes/:id",
            axum::routing::put(|Path(id): Path<i64>, Json(body): Json<Value>| async move {
                // fail loudly if anything besides is_active arrives
                if body != json!({ "is_active": true }) {
                    return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": body.to_string() })));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "id": id,
                        "content": "Rust, Go",
                        "file_name": null,
                        "is_active": true,
                        "created_at": "2024-03-01T10:00:00",
                        "updated_at": "2024-03-02T10:00:00"
                    })),
                )
            }),
        );
        let api = serve(router).await;

        let resume = api
            .update_resume(
                5,
                &ResumeUpdate {
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(resume.is_active);
        assert_eq!(resume.id, 5);
    }
}
