//! HTTP router.
//!
//! Routes:
//! - `GET /health`: diagnostics
//! - `POST /analyze`: multipart `files`
//! - `POST /predict-images`: multipart `n1`/`n2`/`n3` and/or `files`
//!
//! Layers (outermost → innermost): CORS → request log → body limit → handler.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Request body cap: one maximum-size photo plus multipart overhead.
pub const MAX_BODY_BYTES: usize = 55 * 1024 * 1024;

/// Build the service router over shared state.
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/analyze", post(endpoints::analyze::analyze))
        .route("/predict-images", post(endpoints::analyze::predict_images))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(ctx)
        .layer(axum::middleware::from_fn(
            middleware::request_log::log_request,
        ))
        // Browser clients are served from other origins
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::core_state::tests::{constant_artifact, test_core};
    use crate::pipeline::aggregate::ReconcilePolicy;
    use crate::pipeline::decode::tests::make_test_image;
    use crate::pipeline::embedding::ReferenceEmbedder;

    pub(crate) const BOUNDARY: &str = "anemodx-test-boundary";

    /// Encode `(field, filename, bytes)` parts as a multipart/form-data body.
    pub(crate) fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, bytes) in parts {
            let disposition = match filename {
                Some(f) => format!("form-data; name=\"{field}\"; filename=\"{f}\""),
                None => format!("form-data; name=\"{field}\""),
            };
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    pub(crate) fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_of(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn nail_png() -> Vec<u8> {
        make_test_image(400, 300, [205, 150, 140])
    }

    #[tokio::test]
    async fn health_reports_loaded_artifact() {
        let app = api_router(test_core(10.0));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["artifact"], "test_model.json");
        assert_eq!(json["has_preprocessor"], false);
        assert_eq!(json["threshold"], 12.5);
        assert_eq!(json["expected_input_dim"], 512);
        assert_eq!(json["strategy"], "embedding");
        assert_eq!(json["device"], "reference");
        assert!(json["pca_components"].is_null());
        assert_eq!(json["artifact_digest"].as_str().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn analyze_three_images() {
        let app = api_router(test_core(10.0));
        let png = nail_png();
        let body = multipart_body(&[
            ("files", Some("n1.png"), &png[..]),
            ("files", Some("n2.png"), &png[..]),
            ("files", Some("n3.png"), &png[..]),
        ]);
        let response = app.oneshot(multipart_request("/analyze", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let json = json_of(response).await;
        assert_eq!(json["hb_pred"], 10.0);
        assert_eq!(json["is_anemic"], 1);
        assert_eq!(json["num_images"], 3);
    }

    #[tokio::test]
    async fn predict_images_accepts_named_slots() {
        let app = api_router(test_core(13.0));
        let png = nail_png();
        let body = multipart_body(&[
            ("n1", Some("a.png"), &png[..]),
            ("n3", Some("c.png"), &png[..]),
        ]);
        let response = app
            .oneshot(multipart_request("/predict-images", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["is_anemic"], 0);
        assert_eq!(json["num_images"], 2);
    }

    #[tokio::test]
    async fn analyze_ignores_named_slots() {
        let app = api_router(test_core(13.0));
        let png = nail_png();
        let body = multipart_body(&[("n1", Some("a.png"), &png[..])]);
        let response = app.oneshot(multipart_request("/analyze", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn no_images_is_bad_request() {
        let app = api_router(test_core(10.0));
        let body = multipart_body(&[("note", None, &b"hello"[..])]);
        let response = app.oneshot(multipart_request("/analyze", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_of(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "No images provided");
    }

    #[tokio::test]
    async fn undecodable_image_names_the_file() {
        let app = api_router(test_core(10.0));
        let garbage = vec![0x42u8; 512];
        let body = multipart_body(&[("files", Some("nail1.jpg"), &garbage[..])]);
        let response = app
            .clone()
            .oneshot(multipart_request("/analyze", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_of(response).await;
        let message = json["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Failed to decode nail1.jpg"), "{message}");

        // The same service keeps answering after the rejected upload.
        let png = nail_png();
        let body = multipart_body(&[("files", Some("nail2.png"), &png[..])]);
        let response = app.oneshot(multipart_request("/analyze", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["hb_pred"], 10.0);
        assert_eq!(json["num_images"], 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_config_error() {
        let core = Arc::new(CoreState::new(
            constant_artifact(400, 12.0),
            Arc::new(ReferenceEmbedder::new()),
            ReconcilePolicy::PadWithZeros,
        ));
        let png = nail_png();
        let body = multipart_body(&[("files", Some("n1.png"), &png[..])]);
        let response = api_router(core)
            .oneshot(multipart_request("/analyze", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_of(response).await;
        assert_eq!(json["error"]["code"], "CONFIG_MISMATCH");
        let message = json["error"]["message"].as_str().unwrap();
        assert!(message.contains("got 512, expected 400"), "{message}");
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = api_router(test_core(10.0));
        let response = app
            .oneshot(Request::get("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn analyze_requires_post() {
        let app = api_router(test_core(10.0));
        let response = app
            .oneshot(Request::get("/analyze").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
