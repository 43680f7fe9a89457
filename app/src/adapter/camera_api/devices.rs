use std::sync::Arc;

use actix_web::{HttpResponse, web};

use crate::device::{AccessoryHost, DeviceId, DeviceReconciler};

use super::{CameraApiError, CameraApiResponse};

pub fn routes<H>(reconciler: Arc<DeviceReconciler<H>>) -> actix_web::Scope
where
    H: AccessoryHost + 'static,
{
    web::scope("/devices")
        .route("", web::get().to(list_devices::<H>))
        .route("", web::delete().to(remove_all_devices::<H>))
        .route("/{device}", web::delete().to(remove_device::<H>))
        .app_data(web::Data::from(reconciler))
}

async fn list_devices<H: AccessoryHost>(reconciler: web::Data<DeviceReconciler<H>>) -> CameraApiResponse {
    Ok(HttpResponse::Ok().json(reconciler.devices().await))
}

//Full reset, stations still reported by the API are created again on the next poll
async fn remove_all_devices<H: AccessoryHost>(reconciler: web::Data<DeviceReconciler<H>>) -> CameraApiResponse {
    let removed: Vec<DeviceId> = reconciler.remove_all().await.into_iter().map(|d| d.id).collect();
    tracing::info!("Removed {} devices", removed.len());

    Ok(HttpResponse::Ok().json(removed))
}

async fn remove_device<H: AccessoryHost>(
    reconciler: web::Data<DeviceReconciler<H>>,
    path: web::Path<String>,
) -> CameraApiResponse {
    let device = path.into_inner();
    let unknown = || CameraApiError::UnknownDevice { device: device.clone() };

    let id: DeviceId = device.parse().map_err(|_| unknown())?;
    let removed = reconciler.remove(&id).await.ok_or_else(unknown)?;

    Ok(HttpResponse::Ok().json(removed))
}
