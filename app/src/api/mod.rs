use std::{collections::BTreeMap, sync::Arc};

use actix_web::{
    HttpResponse, ResponseError,
    web::{self, Json, Path},
};
use derive_more::derive::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::{
    core::unit::DegreeCelsius,
    device::{DeviceId, DeviceMode, Write},
    gateway::DeviceGateway,
    status_cache::StatusCache,
    write_queue::WriteQueue,
};

/// Operator view on the synchronized devices. Reads go through the status cache, writes through the queue.
pub struct DeviceApi<G> {
    devices: BTreeMap<DeviceId, String>,
    cache: StatusCache<G>,
    queue: WriteQueue<G>,
}

impl<G: DeviceGateway> DeviceApi<G> {
    pub fn new(devices: impl IntoIterator<Item = (DeviceId, String)>, cache: StatusCache<G>, queue: WriteQueue<G>) -> Self {
        Self {
            devices: devices.into_iter().collect(),
            cache,
            queue,
        }
    }

    fn known(&self, id: String) -> Result<DeviceId, ApiError> {
        let device_id = DeviceId::new(id);
        if self.devices.contains_key(&device_id) {
            Ok(device_id)
        } else {
            Err(ApiError::UnknownDevice(device_id.to_string()))
        }
    }
}

pub fn new_routes<G: DeviceGateway>(api: Arc<DeviceApi<G>>) -> actix_web::Scope {
    web::scope("/api/devices")
        .route("", web::get().to(list_devices::<G>))
        .route("/{id}", web::get().to(get_status::<G>))
        .route("/{id}/errors", web::get().to(get_errors::<G>))
        .route("/{id}/desired", web::get().to(get_desired::<G>))
        .route("/{id}/target_temperature", web::put().to(put_target_temperature::<G>))
        .route("/{id}/mode", web::put().to(put_mode::<G>))
        .app_data(web::Data::from(api))
}

type ApiResponse = Result<HttpResponse, ApiError>;

#[derive(Debug, Error, Display)]
enum ApiError {
    #[display("Unknown device {_0}")]
    UnknownDevice(#[error(not(source))] String),

    #[display("No data available")]
    NotFound,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        tracing::warn!("ApiError: {:?}", self);

        match self {
            ApiError::UnknownDevice(_) | ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TargetTemperatureRequest {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: DeviceMode,
}

async fn list_devices<G: DeviceGateway>(api: web::Data<DeviceApi<G>>) -> ApiResponse {
    #[derive(Serialize)]
    struct Row<'a> {
        id: &'a DeviceId,
        name: &'a str,
        connected: Option<bool>,
        verification_pending: bool,
    }

    let rows: Vec<Row> = api
        .devices
        .iter()
        .map(|(id, name)| Row {
            id,
            name,
            connected: api.cache.cached(id).map(|status| status.connected),
            verification_pending: api.queue.desired_state(id).is_some_and(|s| s.verification_due.is_some()),
        })
        .collect();

    Ok(HttpResponse::Ok().json(rows))
}

async fn get_status<G: DeviceGateway>(api: web::Data<DeviceApi<G>>, id: Path<String>) -> ApiResponse {
    let device_id = api.known(id.into_inner())?;

    match api.cache.get(&device_id).await {
        Some(status) => Ok(HttpResponse::Ok().json(status)),
        None => Err(ApiError::NotFound),
    }
}

async fn get_errors<G: DeviceGateway>(api: web::Data<DeviceApi<G>>, id: Path<String>) -> ApiResponse {
    let device_id = api.known(id.into_inner())?;

    Ok(HttpResponse::Ok().json(api.cache.error_state(&device_id)))
}

async fn get_desired<G: DeviceGateway>(api: web::Data<DeviceApi<G>>, id: Path<String>) -> ApiResponse {
    let device_id = api.known(id.into_inner())?;

    match api.queue.desired_state(&device_id) {
        Some(desired) => Ok(HttpResponse::Ok().json(desired)),
        None => Err(ApiError::NotFound),
    }
}

async fn put_target_temperature<G: DeviceGateway>(
    api: web::Data<DeviceApi<G>>,
    id: Path<String>,
    body: Json<TargetTemperatureRequest>,
) -> ApiResponse {
    let device_id = api.known(id.into_inner())?;

    api.queue
        .enqueue(&device_id, Write::TargetTemperature(DegreeCelsius(body.value)));
    Ok(HttpResponse::Accepted().finish())
}

async fn put_mode<G: DeviceGateway>(
    api: web::Data<DeviceApi<G>>,
    id: Path<String>,
    body: Json<ModeRequest>,
) -> ApiResponse {
    let device_id = api.known(id.into_inner())?;

    api.queue.enqueue(&device_id, Write::Mode(body.mode));
    Ok(HttpResponse::Accepted().finish())
}
