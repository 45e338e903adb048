pub mod relay;

use crate::cli::Args;
use log::info;
use relay::{ RelayState, RELAY_ROUTE };
use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

pub struct Server {
    addr: String,
    state: RelayState,
    args: Args,
}

impl Server {
    pub fn new(args: Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let state = RelayState::new(
            args.upstream_url.clone(),
            args.upstream_api_key.clone(),
            Duration::from_secs(args.upstream_connect_timeout_secs)
        )?;

        Ok(Self {
            addr: args.server_addr.clone(),
            state,
            args,
        })
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = relay::router(self.state.clone());

        match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    cert_path,
                    key_path
                ).await?;

                info!("Relay listening on https://{}{} -> {}", addr, RELAY_ROUTE, self.state.upstream_url());
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            }
            (true, _, _) => {
                return Err("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into());
            }
            (false, _, _) => {
                let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                    format!("Failed to bind relay to {}: {}. Try a different port.", addr, e)
                })?;
                info!("Relay listening on http://{}{} -> {}", addr, RELAY_ROUTE, self.state.upstream_url());
                axum::serve(listener, app.into_make_service()).await?;
            }
        }

        Ok(())
    }
}
