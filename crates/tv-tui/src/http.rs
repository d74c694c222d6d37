use crate::action::{ControllerEvent, RemoteKey};
use crate::provider::ChannelDataProvider;
use crate::session::SessionSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HttpState {
    pub event_tx: mpsc::Sender<ControllerEvent>,
    pub snapshots: watch::Receiver<SessionSnapshot>,
    pub provider: Arc<dyn ChannelDataProvider>,
}

#[derive(Serialize)]
struct ChannelInfo {
    idx: usize,
    id: String,
    number: u32,
    name: String,
    category: String,
    favorite: bool,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/channels", get(get_channels))
        .route("/api/key/:name", get(press_key).post(press_key))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: HttpState) {
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!("HTTP server error: {}", e);
    }
}

pub fn start_server(bind_address: String, port: u16, state: HttpState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };
        info!("HTTP remote listening on http://{}", addr);
        serve(listener, state).await;
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<SessionSnapshot> {
    Json(state.snapshots.borrow().clone())
}

async fn get_channels(State(state): State<HttpState>) -> Result<Json<Vec<ChannelInfo>>, StatusCode> {
    let channels = state.provider.list_channels().await.map_err(|e| {
        warn!("HTTP API: channel list unavailable: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok(Json(
        channels
            .into_iter()
            .enumerate()
            .map(|(idx, c)| ChannelInfo {
                idx,
                id: c.id,
                number: c.number,
                name: c.name,
                category: c.category,
                favorite: c.favorite,
            })
            .collect(),
    ))
}

async fn press_key(State(state): State<HttpState>, Path(name): Path<String>) -> StatusCode {
    let Some(key) = RemoteKey::from_name(&name) else {
        return StatusCode::NOT_FOUND;
    };
    info!("HTTP API: key {:?}", key);
    if state.event_tx.send(ControllerEvent::Key(key)).await.is_err() {
        error!("Failed to forward key {:?}", key);
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LineupProvider;
    use crate::session::OverlayMode;
    use tv_proto::protocol::Channel;

    async fn spawn_server() -> (
        String,
        mpsc::Receiver<ControllerEvent>,
        watch::Sender<SessionSnapshot>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (snapshot_tx, snapshots) = watch::channel(SessionSnapshot::default());
        let provider = Arc::new(LineupProvider::from_channels(vec![Channel {
            id: "bbc1".into(),
            name: "BBC One".into(),
            number: 1,
            ..Channel::default()
        }]));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(
            listener,
            HttpState {
                event_tx,
                snapshots,
                provider,
            },
        ));
        (base, event_rx, snapshot_tx)
    }

    #[tokio::test]
    async fn test_key_is_forwarded_to_controller() {
        let (base, mut rx, _snap) = spawn_server().await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/key/down", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        match rx.recv().await {
            Some(ControllerEvent::Key(RemoteKey::Down)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_key_is_404() {
        let (base, _rx, _snap) = spawn_server().await;
        let resp = reqwest::get(format!("{}/api/key/volume", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_state_and_channels() {
        let (base, _rx, snap) = spawn_server().await;
        snap.send_replace(SessionSnapshot {
            mode: OverlayMode::Controls,
            channel_count: 1,
            ..SessionSnapshot::default()
        });
        let state: serde_json::Value = reqwest::get(format!("{}/api/state", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["mode"], "controls");
        assert_eq!(state["channel_count"], 1);

        let channels: serde_json::Value = reqwest::get(format!("{}/api/channels", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(channels[0]["id"], "bbc1");
        assert_eq!(channels[0]["name"], "BBC One");
    }
}
