use std::sync::Arc;

use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;

use crate::camera::{CameraHub, ConnectionId, PrepareRequest, SessionId, StartRequest, StreamingSessionManager};
use crate::device::DeviceId;

use super::{CameraApiError, CameraApiResponse};

const DEFAULT_SNAPSHOT_SIZE: u32 = 640;

pub fn routes(cameras: Arc<CameraHub>) -> actix_web::Scope {
    web::scope("/cameras")
        .route("/connections/{connection}/close", web::post().to(close_connection))
        .route("/{device}/sessions", web::post().to(prepare_session))
        .route("/{device}/sessions/{session}/start", web::post().to(start_session))
        .route("/{device}/sessions/{session}/stop", web::post().to(stop_session))
        .route("/{device}/snapshot", web::get().to(snapshot))
        .app_data(web::Data::from(cameras))
}

#[derive(Clone, Debug, Deserialize)]
struct SnapshotQuery {
    width: Option<u32>,
    height: Option<u32>,
}

fn camera(cameras: &CameraHub, device: &str) -> Result<Arc<StreamingSessionManager>, CameraApiError> {
    device
        .parse::<DeviceId>()
        .ok()
        .and_then(|id| cameras.camera(&id))
        .ok_or_else(|| CameraApiError::UnknownDevice {
            device: device.to_string(),
        })
}

async fn prepare_session(
    cameras: web::Data<CameraHub>,
    path: web::Path<String>,
    request: web::Json<PrepareRequest>,
) -> CameraApiResponse {
    let camera = camera(&cameras, &path)?;
    let response = camera.prepare(request.into_inner()).map_err(CameraApiError::Camera)?;

    Ok(HttpResponse::Ok().json(response))
}

async fn start_session(
    cameras: web::Data<CameraHub>,
    path: web::Path<(String, String)>,
    request: Option<web::Json<StartRequest>>,
) -> CameraApiResponse {
    let (device, session) = path.into_inner();
    let camera = camera(&cameras, &device)?;
    let request = request.map(web::Json::into_inner).unwrap_or_default();

    let started = camera
        .start(&SessionId::new(&session), &request)
        .map_err(CameraApiError::Camera)?;

    Ok(HttpResponse::Ok().json(json!({ "started": started })))
}

async fn stop_session(cameras: web::Data<CameraHub>, path: web::Path<(String, String)>) -> CameraApiResponse {
    let (device, session) = path.into_inner();
    let stopped = camera(&cameras, &device)?.stop(&SessionId::new(&session));

    Ok(HttpResponse::Ok().json(json!({ "stopped": stopped })))
}

async fn close_connection(cameras: web::Data<CameraHub>, path: web::Path<String>) -> CameraApiResponse {
    cameras.handle_close_connection(&ConnectionId(path.into_inner()));
    Ok(HttpResponse::NoContent().finish())
}

async fn snapshot(
    cameras: web::Data<CameraHub>,
    path: web::Path<String>,
    query: web::Query<SnapshotQuery>,
) -> CameraApiResponse {
    let camera = camera(&cameras, &path)?;
    let image = camera
        .snapshot(
            query.width.unwrap_or(DEFAULT_SNAPSHOT_SIZE),
            query.height.unwrap_or(DEFAULT_SNAPSHOT_SIZE),
        )
        .await
        .map_err(CameraApiError::Camera)?;

    Ok(HttpResponse::Ok().content_type(mime::IMAGE_JPEG).body(image))
}
