use actix_web::{get, post, web::Json, HttpResponse};
use serde_json::json;

use common::{context::Context, error};

use crate::service::auth::{AuthService, LoginRequest, RegisterRequest};

#[post("/api/auth/register")]
pub async fn register(
    context: Context,
    Json(data): Json<RegisterRequest>,
) -> error::Result<HttpResponse> {
    let session = AuthService::new(context).register(data).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "User registered",
        "user": session.user,
        "token": session.token,
    })))
}

#[post("/api/auth/login")]
pub async fn login(context: Context, Json(data): Json<LoginRequest>) -> error::Result<HttpResponse> {
    let session = AuthService::new(context).login(data).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Logged in",
        "user": session.user,
        "token": session.token,
    })))
}

#[get("/api/auth/me")]
pub async fn me(context: Context) -> error::Result<HttpResponse> {
    let user = AuthService::new(context).me().await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "user": user})))
}

#[cfg(test)]
mod tests {
    use actix_web::test::{self, init_service, TestRequest};
    use serde_json::{json, Value};

    use crate::{create_app, test_utils::TestEnv};

    #[actix_web::test]
    async fn register_login_me() {
        let env = TestEnv::new();
        let app = init_service(create_app(env.state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "name": "Ravi",
                "email": "ravi@example.com",
                "password": "hunter22",
                "phone": "5551234",
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status().as_u16(), 201);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["role"], "citizen");
        assert!(body["user"].get("password").is_none());
        assert!(body["user"].get("salt").is_none());

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "ravi@example.com", "password": "hunter22"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["user"]["phone"], "5551234");

        let req = TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["user"]["email"], "ravi@example.com");
    }

    #[actix_web::test]
    async fn failures_use_error_envelope() {
        let env = TestEnv::new();
        let app = init_service(create_app(env.state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "ghost@example.com", "password": "whatever"}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status().as_u16(), 401);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Invalid credentials");

        let req = TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status().as_u16(), 401);

        let req = TestRequest::post()
            .uri("/api/auth/register")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"name\": ")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status().as_u16(), 400);
    }
}
