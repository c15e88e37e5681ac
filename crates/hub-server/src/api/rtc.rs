use crate::state::AppState;
use axum::{extract::State, Json};
use hub_protocol::IceServersResponse;

pub async fn get_ice_servers(State(state): State<AppState>) -> Json<IceServersResponse> {
    Json(IceServersResponse {
        ice_servers: state.config.ice_servers(),
    })
}
