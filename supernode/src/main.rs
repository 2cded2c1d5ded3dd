use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use rta_common::crypto::KeyPair;
use rta_supernode::{
    config::{Config, QuorumRules},
    context::PaymentContext,
    rpc::{Handlers, RtaRpcServer},
    rta::{AuthRequestHandler, AuthResponseHandler},
    supernode::Supernode,
    transport::{CryptonodeClient, Transport},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let keypair = match &config.identity_key {
        Some(secret) => KeyPair::from_secret(secret),
        None => {
            warn!("no identity key supplied, generating a fresh one");
            KeyPair::generate()
        }
    };
    let node = Arc::new(Supernode::new(keypair));
    info!("supernode identity: {}", node.id_key_hex());

    let context = Arc::new(PaymentContext::new(Duration::from_secs(
        config.rta_tx_ttl_seconds,
    )));
    let transport: Arc<dyn Transport> = Arc::new(CryptonodeClient::new(
        config.cryptonode_address.clone(),
        Duration::from_secs(config.network_timeout_seconds),
    )?);
    let quorum = QuorumRules::from(&config);

    let handlers = Handlers {
        auth_request: Arc::new(AuthRequestHandler::new(context.clone(), node.clone())),
        auth_response: Arc::new(AuthResponseHandler::new(
            context.clone(),
            node.clone(),
            quorum,
        )),
        transport,
    };
    let server = RtaRpcServer::new(&config.rpc_bind_address, config.rpc_threads, handlers).await?;

    // reap expired payment entries in the background; reads already treat
    // them as absent
    {
        let context = context.clone();
        let period = context.ttl();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let reaped = context.sweep_expired();
                if reaped > 0 {
                    debug!("reaped {} expired payment context entries", reaped);
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    server.stop().await;
    Ok(())
}
