//! Inbound RPC server.
//!
//! Two routes, both POSTed by the local cryptonode with a `multicast`
//! JSON-RPC envelope: the authorization request from the payer's proxy and
//! the votes of the other sample members. Each delivery becomes one task;
//! the error envelope is produced at this single point.

use std::sync::Arc;

use actix_web::{
    dev::ServerHandle,
    web::{self, Bytes, Data},
    App, HttpResponse, HttpServer,
};
use anyhow::Context as AnyContext;
use log::{info, warn};
use rta_common::rpc::{Id, RpcRequest, RpcResponseError};
use tokio::sync::Mutex;

use crate::{
    config::{AUTHORIZE_RTA_TX_REQUEST_PATH, AUTHORIZE_RTA_TX_RESPONSE_PATH},
    rta::{AuthRequestHandler, AuthResponseHandler},
    task::{dispatch, TaskHandler},
    transport::Transport,
};

/// Everything a route needs to run a task.
#[derive(Clone)]
pub struct Handlers {
    pub auth_request: Arc<AuthRequestHandler>,
    pub auth_response: Arc<AuthResponseHandler>,
    pub transport: Arc<dyn Transport>,
}

pub type SharedRtaRpcServer = Arc<RtaRpcServer>;

pub struct RtaRpcServer {
    handle: Mutex<Option<ServerHandle>>,
}

impl RtaRpcServer {
    pub async fn new(
        bind_address: &str,
        threads: Option<usize>,
        handlers: Handlers,
    ) -> Result<SharedRtaRpcServer, anyhow::Error> {
        let server = Arc::new(Self {
            handle: Mutex::new(None),
        });

        info!("Starting RPC server on {}", bind_address);
        let data = Data::new(handlers);
        let mut builder = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route(
                    AUTHORIZE_RTA_TX_REQUEST_PATH,
                    web::post().to(authorize_rta_tx_request),
                )
                .route(
                    AUTHORIZE_RTA_TX_RESPONSE_PATH,
                    web::post().to(authorize_rta_tx_response),
                )
        })
        .disable_signals()
        .bind(bind_address)
        .context("Failed to bind RPC server")?;

        if let Some(threads) = threads {
            builder = builder.workers(threads);
        }
        let http_server = builder.run();

        {
            // save the server handle to be able to stop it later
            let handle = http_server.handle();
            let mut lock = server.handle.lock().await;
            *lock = Some(handle);
        }
        tokio::spawn(http_server);

        Ok(server)
    }

    pub async fn stop(&self) {
        info!("Stopping RPC server...");
        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.take() {
            handle.stop(false).await;
            info!("RPC server is now stopped!");
        } else {
            warn!("RPC server is not running!");
        }
    }
}

// the request id, for the error envelope only; handlers re-parse the body
fn peek_id(body: &[u8]) -> Option<Id> {
    serde_json::from_slice::<RpcRequest>(body)
        .ok()
        .and_then(|request| request.id)
}

async fn run_route<H: TaskHandler>(
    handler: Arc<H>,
    transport: Arc<dyn Transport>,
    body: Bytes,
) -> Result<HttpResponse, RpcResponseError> {
    let id = peek_id(&body);
    let outcome = dispatch(handler, transport, body.to_vec())
        .await
        .map_err(|e| RpcResponseError::new(id, e))?;
    if let Some(background) = outcome.background {
        tokio::spawn(background);
    }
    Ok(HttpResponse::Ok().json(outcome.reply))
}

async fn authorize_rta_tx_request(
    data: Data<Handlers>,
    body: Bytes,
) -> Result<HttpResponse, RpcResponseError> {
    run_route(
        data.auth_request.clone(),
        data.transport.clone(),
        body,
    )
    .await
}

async fn authorize_rta_tx_response(
    data: Data<Handlers>,
    body: Bytes,
) -> Result<HttpResponse, RpcResponseError> {
    run_route(
        data.auth_response.clone(),
        data.transport.clone(),
        body,
    )
    .await
}
