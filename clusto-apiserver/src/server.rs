// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! Root application and server startup.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Context as _;
use axum::{
    Router,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse as _, Response},
    routing::get,
};
use clusto::Clusto;
use tokio::net::TcpListener;

use crate::{
    ApiError, Config, Mode, Mounts, Params, VERSION,
    docs::{EndpointDoc, ModuleDoc, build_docs},
    util::{dumps, render_entities, render_entity},
};

pub static DOC: ModuleDoc = ModuleDoc {
    module: module_path!(),
    description: r"
The clusto API server exposes the clusto inventory over HTTP, as an
alternative to direct database access. Clients only need to reach an HTTP
endpoint instead of the database.

Entities are presented as JSON. The ``Clusto-Mode`` request header selects
the presentation: ``compact`` shows the path of an entity, e.g.
``/pool/webservers``, while ``expanded`` shows its name, driver, attributes,
contents and parents. Each endpoint documents its default.
",
    endpoints: &[
        EndpointDoc {
            name: "favicon",
            text: r"
Tells clients to stop asking for a favicon.

Example::

    $ ${get} -o /dev/null ${server_url}/favicon.ico
    HTTP: 410
    Content-type:
",
        },
        EndpointDoc {
            name: "show_version",
            text: r#"
Shows the version of the server.

Example::

    $ ${get} ${server_url}/__version__
    "${server_version}"
    HTTP: 200
    Content-type: application/json

A HEAD request to ``/`` returns the same, which is cheaper than building the
documentation::

    $ ${head} ${server_url}/
    HTTP/1.1 200 OK
    ...
"#,
        },
        EndpointDoc {
            name: "meta",
            text: r"
Maps the mount point of each installed application to its module.

Example::

    $ ${get} ${server_url}/__meta__
    {
        ...
    }
    HTTP: 200
    Content-type: application/json
",
        },
        EndpointDoc {
            name: "build_docs",
            text: r"
Shows the documentation of the root application. Every mounted application
serves its own documentation at ``<mount point>/__doc__``. The documentation
is reStructuredText, served as plain text.

Example::

    $ ${get} ${server_url}/__doc__
    ...
    HTTP: 200
    Content-type: text/plain; charset=utf-8
",
        },
        EndpointDoc {
            name: "get_by_names",
            text: r#"
Looks up multiple entities by name, regardless of their driver.

 *  Requires HTTP parameter ``name``, may be repeated

Entities are presented compact by default. The status code is 200 if all
entities exist, 206 if only some of them exist, and 404 if none of them
exist.

Example::

    $ ${get} -d 'name=clustometa' -d 'name=nothing' ${server_url}/by-names
    [
        "/clustometa/clustometa"
    ]
    HTTP: 206
    Content-type: application/json

    $ ${get} -d 'name=nothing' ${server_url}/by-names
    "None of the requested objects exist"
    HTTP: 404
    Content-type: application/json
"#,
        },
        EndpointDoc {
            name: "get_by_name",
            text: r#"
Shows a single entity by name, regardless of its driver. The entity is
presented expanded by default.

Example::

    $ ${get} -H 'Clusto-Mode: compact' ${server_url}/by-name/clustometa
    "/clustometa/clustometa"
    HTTP: 200
    Content-type: application/json
"#,
        },
    ],
};

/// Paths served by the root application.
pub const ROOT_PATHS: &[&str] = &[
    "/__doc__",
    "/__meta__",
    "/__version__",
    "/by-name",
    "/by-names",
    "/favicon.ico",
];

#[derive(Debug, Clone)]
pub struct AppState {
    pub clusto: Clusto,
    pub mounts: Arc<Mounts>,
}

impl AppState {
    #[must_use]
    pub fn new(clusto: Clusto, mounts: Mounts) -> Self {
        Self {
            clusto,
            mounts: Arc::new(mounts),
        }
    }
}

/// Base URL of the server as seen by the client.
pub(crate) fn server_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

pub(crate) fn text_response(text: String) -> Response {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        text,
    )
        .into_response()
}

/// Builds the router with the root application and all mounted applications.
pub fn router(state: AppState, quiet: bool) -> Router {
    let mut router = Router::new()
        .route("/", get(build_root_docs).head(show_version))
        .route("/__doc__", get(build_root_docs))
        .route("/__version__", get(show_version))
        .route("/__meta__", get(meta))
        .route("/favicon.ico", get(favicon))
        .route("/by-names", get(get_by_names))
        .route("/by-name/{name}", get(get_by_name));
    for (prefix, app) in state.mounts.iter() {
        log::debug!("Mounting application {app} at {prefix}");
        router = router.merge(app.routes(prefix));
    }
    let router = router.with_state(state);
    if quiet {
        router
    } else {
        router.layer(middleware::from_fn(log_request))
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    log::info!("{method} {uri} -> {status}", status = response.status());
    response
}

async fn favicon() -> StatusCode {
    StatusCode::GONE
}

async fn show_version() -> Response {
    dumps(&VERSION, StatusCode::OK)
}

async fn meta(State(state): State<AppState>) -> Response {
    let modules = state
        .mounts
        .iter()
        .map(|(prefix, app)| (prefix.as_str(), app.doc().module))
        .collect::<BTreeMap<_, _>>();
    dumps(&modules, StatusCode::OK)
}

async fn build_root_docs(State(state): State<AppState>, headers: HeaderMap) -> Response {
    text_response(build_docs(
        &DOC,
        Some(state.mounts.as_ref()),
        &server_url(&headers),
    ))
}

async fn get_by_names(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Params,
) -> Result<Response, ApiError> {
    let mode = Mode::from_headers(&headers, Mode::Compact)?;
    let names = params.get_all("name");
    if names.is_empty() {
        return Err(ApiError::missing_param("name"));
    }
    let (found, missing) = state.clusto.get_by_names(&names).await?;
    if found.is_empty() {
        return Err(ApiError::with_status(
            StatusCode::NOT_FOUND,
            "None of the requested objects exist",
        ));
    }
    let status = if missing.is_empty() {
        StatusCode::OK
    } else {
        log::debug!(
            "Requested objects do not exist: {missing}",
            missing = missing.join(",")
        );
        StatusCode::PARTIAL_CONTENT
    };
    let rendered = render_entities(&state.clusto, &found, mode).await?;
    Ok(dumps(&rendered, status))
}

async fn get_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mode = Mode::from_headers(&headers, Mode::Expanded)?;
    let entity = state.clusto.get_by_name(&name, None).await?;
    let rendered = render_entity(&state.clusto, &entity, mode).await?;
    Ok(dumps(&rendered, StatusCode::OK))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for the shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

/// Opens the database and serves requests until interrupted.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let Config {
        database,
        apiserver,
    } = config;
    let mounts = apiserver.mounts()?;

    let clusto = clusto::open_database(&database.file)
        .await
        .with_context(|| {
            format!(
                "Failed to open database file \"{file}\"",
                file = database.file.display()
            )
        })?;
    log::info!(
        "Opened database file \"{file}\"",
        file = database.file.display()
    );

    let listener = TcpListener::bind((apiserver.host.as_str(), apiserver.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {host}:{port}",
                host = apiserver.host,
                port = apiserver.port
            )
        })?;
    log::info!(
        "Clusto API server {VERSION} listening on http://{addr}",
        addr = listener.local_addr()?
    );

    let app = router(AppState::new(clusto.clone(), mounts), apiserver.quiet);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    clusto.pool().close().await;
    Ok(())
}
