use serde_json::{json, Value};

use crate::response::ApiResponse;

pub async fn health_check() -> ApiResponse<Value> {
    ApiResponse::ok(json!({ "status": "ok" }))
}
