use actix_web::{get, web, HttpResponse, Scope};
use serde::Serialize;

use crate::{services::scheduler::running_tasks, utils::types::ApiResponse};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub tasks: Vec<String>,
}

#[get("/health")]
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(HealthReport {
        status: "OK",
        tasks: running_tasks(),
    }))
}

pub fn health_scope() -> Scope {
    web::scope("")
        .service(health_check)
}
