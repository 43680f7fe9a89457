mod cameras;
mod devices;

use std::sync::Arc;

use actix_web::{HttpResponse, ResponseError, web};
use derive_more::derive::{Display, Error};

use crate::camera::{CameraError, CameraHub};
use crate::device::{AccessoryHost, DeviceReconciler};

pub fn new_routes<H>(reconciler: Arc<DeviceReconciler<H>>, cameras: Arc<CameraHub>) -> actix_web::Scope
where
    H: AccessoryHost + 'static,
{
    web::scope("/api")
        .service(devices::routes(reconciler))
        .service(cameras::routes(cameras))
}

type CameraApiResponse = Result<HttpResponse, CameraApiError>;

#[derive(Debug, Error, Display)]
enum CameraApiError {
    #[display("Unknown device {device}")]
    UnknownDevice { device: String },

    #[display("{_0}")]
    Camera(CameraError),
}

impl ResponseError for CameraApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        tracing::warn!("CameraApiError: {:?}", self);

        match self {
            CameraApiError::UnknownDevice { .. } => StatusCode::NOT_FOUND,
            CameraApiError::Camera(CameraError::StreamLimitReached { .. } | CameraError::SessionActive { .. }) => {
                StatusCode::CONFLICT
            }
            CameraApiError::Camera(CameraError::NoVideoStream { .. }) => StatusCode::BAD_REQUEST,
            CameraApiError::Camera(CameraError::Spawn { .. } | CameraError::Transcoder { .. }) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}
