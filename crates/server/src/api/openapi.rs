#![allow(clippy::needless_for_each)]

use ephemera_core::{ConsumeStatus, ItemId};

use super::schemas::{
    ConsumeFailure, ConsumeRequest, ConsumeResponse, DeactivateResponse, ErrorResponse,
    HealthResponse, MetricsResponse, SweepItemResponse, SweepResponse, UploadRequest,
    UploadResponse,
};

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Ephemera API",
        version = "0.1.0",
        description = "HTTP API for Ephemera. Upload files behind expiring, view-limited links and retrieve them through short-lived signed URLs.",
        license(name = "Apache-2.0")
    ),
    tags(
        (name = "Health", description = "Service health and metrics"),
        (name = "Items", description = "Uploading and deactivating shareable items"),
        (name = "Viewing", description = "Spending views and fetching files"),
        (name = "Reclamation", description = "Deleting blobs of spent items")
    ),
    paths(
        super::health::health,
        super::health::metrics,
        super::items::upload,
        super::items::deactivate,
        super::consume::consume,
        super::blobs::get_blob,
        super::sweep::sweep,
    ),
    components(schemas(
        HealthResponse, MetricsResponse, ErrorResponse,
        UploadRequest, UploadResponse, DeactivateResponse,
        ConsumeRequest, ConsumeResponse, ConsumeFailure, ConsumeStatus, ItemId,
        SweepResponse, SweepItemResponse,
    ))
)]
pub struct ApiDoc;
