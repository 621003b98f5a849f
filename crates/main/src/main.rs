/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The vestry binary: configuration, logging, the HTTP front end and the
//! well-known redirects. Authentication belongs to the deployment: a
//! reverse proxy forwards the verified identity in `X-Remote-User`, and
//! without one the configured current-user-principal applies.

use std::net::SocketAddr;
use std::sync::Arc;

use dav::{Autocreate, DavMethod, HttpResponse, Server, ServerConfig};
use dav_proto::RequestHeaders;
use http_body_util::{BodyExt, Full};
use hyper::{
    Request, Response, StatusCode,
    body::{Bytes, Incoming},
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

const USAGE: &str = "\
usage: vestry --data-root DIR [options]

options:
  --data-root DIR               filesystem root for collection repositories
  --listen ADDR                 socket address to bind (default 127.0.0.1:5232)
  --route-prefix PREFIX         leading URI path to strip before routing
  --current-user-principal P    principal path for unauthenticated requests
  --autocreate MODE             none | principal | defaults
  --strict                      refuse minor client protocol deviations
  --index-threshold N           collection size at which the index kicks in
";

struct Options {
    listen: SocketAddr,
    server: ServerConfig,
}

fn parse_args() -> Result<Options, String> {
    let mut listen: SocketAddr = "127.0.0.1:5232".parse().expect("default listen address");
    let mut config = ServerConfig::default();
    let mut data_root = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("{name} needs a value\n\n{USAGE}"))
        };
        match arg.as_str() {
            "--data-root" | "-d" => data_root = Some(value("--data-root")?),
            "--listen" | "-l" => {
                listen = value("--listen")?
                    .parse()
                    .map_err(|err| format!("invalid listen address: {err}"))?;
            }
            "--route-prefix" => {
                let prefix = value("--route-prefix")?;
                config.route_prefix = prefix.trim_end_matches('/').to_string();
            }
            "--current-user-principal" => {
                config.current_user_principal = Some(value("--current-user-principal")?);
            }
            "--autocreate" => {
                let mode = value("--autocreate")?;
                config.autocreate = Autocreate::parse(&mode)
                    .ok_or_else(|| format!("unknown autocreate mode {mode}"))?;
            }
            "--strict" => config.strict = true,
            "--index-threshold" => {
                config.index_threshold = value("--index-threshold")?
                    .parse()
                    .map_err(|err| format!("invalid index threshold: {err}"))?;
            }
            "--help" | "-h" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other => return Err(format!("unknown option {other}\n\n{USAGE}")),
        }
    }

    config.data_root = data_root.ok_or_else(|| format!("--data-root is required\n\n{USAGE}"))?.into();
    Ok(Options {
        listen,
        server: config,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VESTRY_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let server = Arc::new(Server::new(options.server));
    let listener = match TcpListener::bind(options.listen).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, addr = %options.listen, "cannot bind");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %options.listen, root = %server.config.data_root.display(), "listening");

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        };

        let server = server.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let server = server.clone();
                async move { Ok::<_, std::convert::Infallible>(serve(&server, request).await) }
            });
            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%err, %peer, "connection ended");
            }
        });
    }
}

async fn serve(server: &Server, request: Request<Incoming>) -> Response<Full<Bytes>> {
    let path = request.uri().path().to_string();

    // RFC 6764 service bootstrapping.
    if path == "/.well-known/caldav" || path == "/.well-known/carddav" {
        let target = server
            .default_principal()
            .map(|name| server.principal_href(name))
            .unwrap_or_else(|| "/".to_string());
        return Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header("Location", target)
            .body(Full::new(Bytes::new()))
            .expect("static response");
    }

    let Some(method) = DavMethod::parse(request.method().as_str()) else {
        return plain_status(StatusCode::METHOD_NOT_ALLOWED);
    };

    // Identity forwarded by the authenticating proxy, if any.
    let principal = request
        .headers()
        .get("x-remote-user")
        .and_then(|value| value.to_str().ok())
        .map(|name| name.trim_matches('/').to_string())
        .filter(|name| !name.is_empty());

    let header_pairs: Vec<(String, String)> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let body = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(err) => {
            tracing::debug!(%err, "failed reading request body");
            return plain_status(StatusCode::BAD_REQUEST);
        }
    };

    let mut headers = RequestHeaders::new(&path);
    for (name, value) in &header_pairs {
        headers.parse(name, value);
    }

    let response = server
        .handle_request(method, &headers, body, principal.as_deref())
        .await;
    into_hyper(response)
}

fn plain_status(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("static response")
}

fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let (status, headers, content_type, bytes) = response.body_bytes();
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    if !bytes.is_empty() {
        builder = builder.header("Content-Type", content_type);
    }
    builder
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|_| plain_status(StatusCode::INTERNAL_SERVER_ERROR))
}
