use actix_web::{
    delete, get, patch,
    web::{self, Json},
    HttpResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::{context::Context, error, parse_id};

use crate::service::{
    issue::{AccessMode, IssueService},
    triage::{TriageQuery, TriageService},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotesRequest {
    pub notes: Option<String>,
}

#[get("/api/admin/issues")]
pub async fn get_admin_issues(
    context: Context,
    query: web::Query<TriageQuery>,
) -> error::Result<HttpResponse> {
    let issues = TriageService::new(context).list_filtered(&query).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": issues.len(),
        "issues": issues,
    })))
}

#[get("/api/admin/stats")]
pub async fn get_admin_stats(context: Context) -> error::Result<HttpResponse> {
    let stats = TriageService::new(context).dashboard_stats().await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "stats": stats})))
}

#[get("/api/admin/issues/{id}")]
pub async fn get_admin_issue(
    context: Context,
    id: web::Path<String>,
) -> error::Result<HttpResponse> {
    let issue = IssueService::new(context)
        .get_by_id(parse_id(&id)?, AccessMode::Admin)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "issue": issue})))
}

#[patch("/api/admin/issues/{id}/status")]
pub async fn patch_issue_status(
    context: Context,
    id: web::Path<String>,
    Json(data): Json<StatusRequest>,
) -> error::Result<HttpResponse> {
    let issue = IssueService::new(context)
        .transition_status(parse_id(&id)?, data.status)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Issue status updated successfully",
        "issue": issue,
    })))
}

#[patch("/api/admin/issues/{id}/notes")]
pub async fn patch_issue_notes(
    context: Context,
    id: web::Path<String>,
    Json(data): Json<NotesRequest>,
) -> error::Result<HttpResponse> {
    let issue = IssueService::new(context)
        .set_admin_notes(parse_id(&id)?, data.notes)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Admin notes added successfully",
        "issue": issue,
    })))
}

#[delete("/api/admin/issues/{id}")]
pub async fn delete_admin_issue(
    context: Context,
    id: web::Path<String>,
) -> error::Result<HttpResponse> {
    IssueService::new(context).delete(parse_id(&id)?).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Issue deleted successfully",
    })))
}
