use axum::Json;
use axum::extract::State;
use holonet_service::services::SharedServices;
use holonet_service::transform::VehicleRecord;
use serde::Serialize;

use super::ResponseError;

#[derive(Debug, Serialize)]
pub struct EtlResponse {
    message: String,
    vehicles: Vec<VehicleRecord>,
}

pub async fn run_etl(
    State(services): State<SharedServices>,
) -> Result<Json<EtlResponse>, ResponseError> {
    let vehicles = services.etl.run().await?;

    Ok(Json(EtlResponse {
        message: format!("ETL process completed. Loaded {} vehicles.", vehicles.len()),
        vehicles,
    }))
}
