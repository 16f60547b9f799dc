use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use serde_json::json;

use common::{context::Context, error, parse_id};

use crate::service::issue::{AccessMode, IssueService};

#[post("/api/issues")]
pub async fn post_issue(
    context: Context,
    req: HttpRequest,
    payload: web::Payload,
) -> error::Result<HttpResponse> {
    let issue = IssueService::new(context).report(&req, payload).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Issue reported successfully",
        "issue": issue,
    })))
}

#[get("/api/issues/my-issues")]
pub async fn get_my_issues(context: Context) -> error::Result<HttpResponse> {
    let issues = IssueService::new(context).my_issues().await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": issues.len(),
        "issues": issues,
    })))
}

#[get("/api/issues/track/{id}")]
pub async fn track_issue(context: Context, id: web::Path<String>) -> error::Result<HttpResponse> {
    let issue = IssueService::new(context)
        .get_by_id(parse_id(&id)?, AccessMode::Public)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "issue": issue})))
}

#[get("/api/issues/{id}")]
pub async fn get_issue(context: Context, id: web::Path<String>) -> error::Result<HttpResponse> {
    let issue = IssueService::new(context)
        .get_by_id(parse_id(&id)?, AccessMode::Owner)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "issue": issue})))
}

#[delete("/api/issues/{id}")]
pub async fn delete_issue(context: Context, id: web::Path<String>) -> error::Result<HttpResponse> {
    IssueService::new(context).delete(parse_id(&id)?).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Issue deleted successfully",
    })))
}
