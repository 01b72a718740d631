/*
 * SPDX-FileCopyrightText: 2026 The Linkproxy Authors
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use axum_server::tls_rustls::RustlsConfig;
use linkproxy_server::ProxyConfig;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let cfg = match ProxyConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("linkproxy: {err}");
            std::process::exit(2);
        }
    };
    let addr = cfg.bind;
    let tls = cfg.tls.clone();

    let app = match linkproxy_server::app(cfg) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("linkproxy: {err:#}");
            std::process::exit(2);
        }
    };

    let served = match tls {
        Some(tls) => {
            let rustls = match RustlsConfig::from_pem_file(&tls.cert, &tls.key).await {
                Ok(rustls) => rustls,
                Err(err) => {
                    eprintln!(
                        "linkproxy: loading {} / {}: {err}",
                        tls.cert.display(),
                        tls.key.display()
                    );
                    std::process::exit(2);
                }
            };
            info!("linkproxy listening on https://{addr}");
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!("linkproxy listening on http://{addr}");
            axum_server::bind(addr).serve(app.into_make_service()).await
        }
    };

    if let Err(err) = served {
        eprintln!("linkproxy server error: {err}");
        std::process::exit(1);
    }
}
