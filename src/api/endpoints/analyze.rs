//! Upload endpoints: multipart photos → hemoglobin estimate.
//!
//! `POST /analyze` takes repeated `files` fields. `POST /predict-images`
//! additionally accepts the named slots `n1`, `n2`, `n3`, which come first
//! in slot order, followed by any `files`.

use axum::extract::{Multipart, State};
use axum::Json;
use tracing::{debug, Span};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::{AnalysisOutcome, ImageUpload};

const FILES_FIELD: &str = "files";
const NAMED_SLOTS: [&str; 3] = ["n1", "n2", "n3"];

/// `POST /analyze`
pub async fn analyze(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let uploads = read_uploads(multipart, &[]).await?;
    run_analysis(ctx, uploads).await
}

/// `POST /predict-images`
pub async fn predict_images(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let uploads = read_uploads(multipart, &NAMED_SLOTS).await?;
    run_analysis(ctx, uploads).await
}

/// Collect image parts: named slots first (in slot order), then `files`.
///
/// Parts that are empty and unnamed are what browsers send for an
/// unfilled file input; they are skipped. Unknown fields are ignored.
async fn read_uploads(
    mut multipart: Multipart,
    named: &[&str],
) -> Result<Vec<ImageUpload>, ApiError> {
    let mut slots: Vec<Option<ImageUpload>> = vec![None; named.len()];
    let mut files: Vec<ImageUpload> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        let slot = named.iter().position(|n| *n == name);
        if slot.is_none() && name != FILES_FIELD {
            debug!(field = %name, "Ignoring multipart field");
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        if bytes.is_empty() && filename.as_deref().map_or(true, str::is_empty) {
            debug!(field = %name, "Skipping empty file part");
            continue;
        }

        let upload = ImageUpload::new(filename, bytes.to_vec());
        match slot {
            Some(i) => slots[i] = Some(upload),
            None => files.push(upload),
        }
    }

    Ok(slots.into_iter().flatten().chain(files).collect())
}

/// Run the analyzer on a blocking thread so decode and inference do not
/// stall the runtime.
async fn run_analysis(
    ctx: ApiContext,
    uploads: Vec<ImageUpload>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    debug!(count = uploads.len(), "Uploads received");
    let core = ctx.core.clone();
    let span = Span::current();
    let outcome = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        core.analyzer().analyze(uploads)
    })
    .await??;
    Ok(Json(outcome))
}
