use crate::broker::DashboardEvent;
use crate::charts::ChartFrames;
use crate::env_file::{BrokerSettings, EnvFileError};
use crate::status::StatusView;
use log::{info, warn};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::serde::{json::Json, Serialize};
use rocket::{get, post, routes, Build, Rocket, State};
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};

/// Shared with every request handler.
pub struct ServerState {
    pub env_file_path: PathBuf,
    pub events: mpsc::UnboundedSender<DashboardEvent>,
    pub status: watch::Receiver<StatusView>,
    pub charts: watch::Receiver<ChartFrames>,
}

/// API Response
#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
struct ApiResponse {
    status: String,
    message: String,
}

/// Body of a failed config request
#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing: Vec<&'static str>,
}

impl From<&EnvFileError> for ErrorBody {
    fn from(error: &EnvFileError) -> Self {
        Self {
            error: error.to_string(),
            missing: error.missing_keys().to_vec(),
        }
    }
}

/// Everything the dashboard page draws
#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
struct DashboardResponse {
    status: StatusView,
    charts: ChartFrames,
}

/// CORS Fairing for Rocket
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _req: &'r rocket::Request<'_>, res: &mut rocket::Response<'r>) {
        res.set_header(rocket::http::Header::new("Access-Control-Allow-Origin", "*"));
        res.set_header(rocket::http::Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST",
        ));
        res.set_header(rocket::http::Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type",
        ));
    }
}

/// Broker connection settings read from the env file
#[get("/mqtt-config")]
fn mqtt_config(state: &State<ServerState>) -> Result<Json<BrokerSettings>, (Status, Json<ErrorBody>)> {
    BrokerSettings::from_env_file(&state.env_file_path)
        .map(Json)
        .map_err(|e| {
            warn!("Config request failed: {}", e);
            (Status::InternalServerError, Json(ErrorBody::from(&e)))
        })
}

/// Current status, log and chart frames
#[get("/api/dashboard")]
fn dashboard(state: &State<ServerState>) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        status: state.status.borrow().clone(),
        charts: state.charts.borrow().clone(),
    })
}

/// Ask the connection manager to rebuild its connection
#[post("/api/reconnect")]
fn reconnect(state: &State<ServerState>) -> (Status, Json<ApiResponse>) {
    match state.events.send(DashboardEvent::ManualReconnectRequested) {
        Ok(()) => (
            Status::Accepted,
            Json(ApiResponse {
                status: "success".to_string(),
                message: "Reconnect requested".to_string(),
            }),
        ),
        Err(_) => (
            Status::ServiceUnavailable,
            Json(ApiResponse {
                status: "error".to_string(),
                message: "Dashboard is not running".to_string(),
            }),
        ),
    }
}

/// Root handler
#[get("/")]
fn root_handler() -> Json<ApiResponse> {
    Json(ApiResponse {
        status: "success".to_string(),
        message: "ThermoFlux dashboard is running".to_string(),
    })
}

pub fn build_rocket(state: ServerState, address: IpAddr, port: u16) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", address))
        .merge(("port", port));

    rocket::custom(figment)
        .manage(state)
        .mount("/", routes![root_handler, mqtt_config, dashboard, reconnect])
        .attach(Cors)
}

/// Run the Rocket server until it shuts down
pub async fn run_rest_server(rocket: Rocket<Build>) -> Result<(), rocket::Error> {
    rocket.launch().await?;
    info!("REST server stopped.");
    Ok(())
}
