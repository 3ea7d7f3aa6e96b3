// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! Creation, lookup, deletion and containment of entities.

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse as _, Response},
    routing::get,
};
use clusto::{Clusto, Driver, Entity, EntityFilter};
use itertools::Itertools as _;

use crate::{
    ApiError, AppState, Mode, Params,
    docs::{EndpointDoc, ModuleDoc},
    util::{dumps, render_entities, render_entity},
};

const WARNINGS_HEADER: &str = "warnings";

/// Parameters accepted when listing entities.
const FILTER_PARAMS: &[&str] = &["names", "clusto_types", "clusto_drivers"];

pub static DOC: ModuleDoc = ModuleDoc {
    module: module_path!(),
    description: "The entity application handles creation, deletion and lookup of \
entities and maintains their contents.",
    endpoints: &[
        EndpointDoc {
            name: "get_entities",
            text: r#"
Lists all entities, optionally restricted to a driver. Repeatable filter
parameters ``names``, ``clusto_types`` and ``clusto_drivers`` narrow down
the result. Entities are presented compact unless requested otherwise
with the ``Clusto-Mode`` header.

Example::

    $ ${get} ${server_url}/entity/clustometa
    [
        "/clustometa/clustometa"
    ]
    HTTP: 200
    Content-type: application/json

Asking for a driver that does not exist fails::

    $ ${get} ${server_url}/entity/nondriver
    "The requested driver \"nondriver\" does not exist"
    HTTP: 409
    Content-type: application/json
"#,
        },
        EndpointDoc {
            name: "create",
            text: r#"
Creates entities of the given driver.

 *  Requires HTTP parameter ``name``, may be repeated

Example::

    $ ${post} -d 'name=createpool1' ${server_url}/entity/pool
    [
        "/pool/createpool1"
    ]
    HTTP: 201
    Content-type: application/json

If any of the entities already exists it is returned as is. The status
code is 202 and the ``Warnings`` header names the existing entities::

    $ ${post_i} -d 'name=createpool1' -d 'name=createpool2' ${server_url}/entity/pool
    HTTP/1.1 202 Accepted
    ...
    warnings: Entity(s) /pool/createpool1 already exist(s)
    ...
"#,
        },
        EndpointDoc {
            name: "delete",
            text: r#"
Deletes entities of the given driver.

 *  Requires HTTP parameter ``name``, may be repeated

Nothing is deleted unless all entities exist and match the driver.

Example::

    $ ${delete} -d 'name=servercreated' ${server_url}/entity/basicserver
    HTTP: 204
    Content-type:
    $ ${delete} -d 'name=servercreated' ${server_url}/entity/basicserver
    HTTP: 404
    Content-type:
"#,
        },
        EndpointDoc {
            name: "show",
            text: r#"
Shows an entity with its attributes, contents and parents.

Example::

    $ ${get} ${server_url}/entity/pool/showpool
    {
        "attrs": [],
        "contents": [],
        "driver": "pool",
        "name": "showpool",
        "parents": []
    }
    HTTP: 200
    Content-type: application/json
"#,
        },
        EndpointDoc {
            name: "insert",
            text: r#"
Inserts entities into the contents of an entity.

 *  Requires HTTP parameter ``device``, may be repeated

Example::

    $ ${put} -d 'device=insertserver' ${server_url}/entity/pool/insertpool
    {
        "attrs": [],
        "contents": [
            "/basicserver/insertserver"
        ],
        "driver": "pool",
        "name": "insertpool",
        "parents": []
    }
    HTTP: 200
    Content-type: application/json

Nothing is inserted if any of the devices does not exist.
"#,
        },
        EndpointDoc {
            name: "remove",
            text: r#"
Removes entities from the contents of an entity.

 *  Requires HTTP parameter ``device``, may be repeated

Example::

    $ ${delete} -d 'device=insertserver' ${server_url}/entity/pool/insertpool
    {
        "attrs": [],
        "contents": [],
        "driver": "pool",
        "name": "insertpool",
        "parents": []
    }
    HTTP: 200
    Content-type: application/json
"#,
        },
    ],
};

pub(super) fn routes(router: Router<AppState>, prefix: &str) -> Router<AppState> {
    router
        .route(prefix, get(get_all_entities))
        .route(&format!("{prefix}/"), get(get_all_entities))
        .route(
            &format!("{prefix}/{{driver}}"),
            get(get_entities).post(create).delete(delete),
        )
        .route(
            &format!("{prefix}/{{driver}}/{{name}}"),
            get(show).put(insert).delete(remove),
        )
}

fn requested_driver_not_found(driver: &str) -> ApiError {
    ApiError::with_status(
        StatusCode::CONFLICT,
        format!("The requested driver \"{driver}\" does not exist"),
    )
}

async fn get_all_entities(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Params,
) -> Result<Response, ApiError> {
    list_entities(&state.clusto, None, &headers, &params).await
}

async fn get_entities(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    headers: HeaderMap,
    params: Params,
) -> Result<Response, ApiError> {
    list_entities(&state.clusto, Some(driver), &headers, &params).await
}

async fn list_entities(
    clusto: &Clusto,
    driver: Option<String>,
    headers: &HeaderMap,
    params: &Params,
) -> Result<Response, ApiError> {
    let mode = Mode::from_headers(headers, Mode::Compact)?;
    if let Some(unknown) = params.names().find(|name| !FILTER_PARAMS.contains(name)) {
        return Err(ApiError::BadRequest(format!(
            "Unknown parameter \"{unknown}\""
        )));
    }
    let values = |name: &str| -> Vec<String> {
        params
            .get_all(name)
            .into_iter()
            .map(ToOwned::to_owned)
            .collect()
    };
    let mut filter = EntityFilter {
        names: values("names"),
        drivers: values("clusto_drivers"),
        types: values("clusto_types"),
    };
    if let Some(driver) = driver {
        if Driver::lookup(&driver).is_none() {
            return Err(requested_driver_not_found(&driver));
        }
        // The driver in the path takes precedence.
        filter.drivers = vec![driver];
    }
    let entities = clusto.get_entities(&filter).await?;
    let rendered = render_entities(clusto, &entities, mode).await?;
    Ok(dumps(&rendered, StatusCode::OK))
}

async fn create(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    headers: HeaderMap,
    params: Params,
) -> Result<Response, ApiError> {
    let mode = Mode::from_headers(&headers, Mode::Compact)?;
    if Driver::lookup(&driver).is_none() {
        return Err(clusto::Error::UnknownDriver(driver).into());
    }
    let AppState { clusto, .. } = &state;
    let names = params.get_all("name");
    if names.is_empty() {
        return Err(ApiError::missing_param("name"));
    }
    let entities = clusto.create_all(&names, &driver).await?;
    let existing = entities
        .iter()
        .filter(|(_, created)| !created)
        .map(|(entity, _)| entity.path())
        .unique()
        .join(",");
    let entities = entities
        .iter()
        .map(|(entity, _)| entity)
        .collect::<Vec<_>>();
    let rendered = render_entities(clusto, entities, mode).await?;
    if existing.is_empty() {
        return Ok(dumps(&rendered, StatusCode::CREATED));
    }
    let mut response = dumps(&rendered, StatusCode::ACCEPTED);
    match HeaderValue::from_str(&format!("Entity(s) {existing} already exist(s)")) {
        Ok(warnings) => {
            response.headers_mut().insert(WARNINGS_HEADER, warnings);
        }
        Err(err) => {
            log::warn!("Omitting warnings header: {err}");
        }
    }
    Ok(response)
}

async fn delete(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    params: Params,
) -> Result<Response, ApiError> {
    if Driver::lookup(&driver).is_none() {
        return Err(clusto::Error::UnknownDriver(driver).into());
    }
    let names = params.get_all("name");
    if names.is_empty() {
        return Err(ApiError::missing_param("name"));
    }
    match state.clusto.delete_entities(&names, &driver).await {
        Ok(deleted_count) => {
            log::debug!("Deleted {deleted_count} entities with driver \"{driver}\"");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(clusto::Error::NotFound { name }) => {
            log::debug!("Not deleting any entities: \"{name}\" does not exist");
            Ok(StatusCode::NOT_FOUND.into_response())
        }
        Err(err) => Err(err.into()),
    }
}

async fn show(
    State(state): State<AppState>,
    Path((driver, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mode = Mode::from_headers(&headers, Mode::Expanded)?;
    let entity = state.clusto.get_by_name(&name, Some(&driver)).await?;
    let rendered = render_entity(&state.clusto, &entity, mode).await?;
    Ok(dumps(&rendered, StatusCode::OK))
}

/// Loads all entities named by the `device` parameters.
async fn load_devices(
    clusto: &Clusto,
    params: &Params,
    target: &str,
    action: &str,
) -> Result<Vec<Entity>, ApiError> {
    let names = params.get_all("device");
    let (devices, missing) = clusto.get_by_names(&names).await?;
    if !missing.is_empty() {
        return Err(ApiError::with_status(
            StatusCode::NOT_FOUND,
            format!(
                "Objects {missing} do not exist and cannot be {action} \"{target}\"",
                missing = missing.join(",")
            ),
        ));
    }
    Ok(devices)
}

async fn insert(
    State(state): State<AppState>,
    Path((driver, name)): Path<(String, String)>,
    headers: HeaderMap,
    params: Params,
) -> Result<Response, ApiError> {
    let AppState { clusto, .. } = &state;
    let mode = Mode::from_headers(&headers, Mode::Expanded)?;
    let entity = clusto.get_by_name(&name, Some(&driver)).await?;
    let devices = load_devices(clusto, &params, &name, "inserted into").await?;
    let inserted_count = clusto.insert_all(&entity, &devices).await?;
    log::debug!("Inserted {inserted_count} entities into {path}", path = entity.path());
    let rendered = render_entity(clusto, &entity, mode).await?;
    Ok(dumps(&rendered, StatusCode::OK))
}

async fn remove(
    State(state): State<AppState>,
    Path((driver, name)): Path<(String, String)>,
    headers: HeaderMap,
    params: Params,
) -> Result<Response, ApiError> {
    let AppState { clusto, .. } = &state;
    let mode = Mode::from_headers(&headers, Mode::Expanded)?;
    let entity = clusto.get_by_name(&name, Some(&driver)).await?;
    let devices = load_devices(clusto, &params, &name, "removed from").await?;
    let removed_count = clusto.remove_all(&entity, &devices).await?;
    log::debug!("Removed {removed_count} entities from {path}", path = entity.path());
    let rendered = render_entity(clusto, &entity, mode).await?;
    Ok(dumps(&rendered, StatusCode::OK))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::testing::TestServer;

    #[tokio::test]
    async fn list_entities() {
        let server = TestServer::new().await;
        server.post_form("/entity/pool", "name=p2&name=p1").await;
        server.post_form("/entity/basicserver", "name=s1").await;

        let (status, body) = server.get_json("/entity/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                "/clustometa/clustometa",
                "/pool/p1",
                "/pool/p2",
                "/basicserver/s1"
            ])
        );

        let (status, body) = server.get_json("/entity").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(4));

        let (status, body) = server.get_json("/entity/pool").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["/pool/p1", "/pool/p2"]));

        let (_, body) = server
            .get_json("/entity/?clusto_types=server&clusto_types=clustometa")
            .await;
        assert_eq!(body, json!(["/clustometa/clustometa", "/basicserver/s1"]));

        let (_, body) = server.get_json("/entity/?names=p2&names=s1").await;
        assert_eq!(body, json!(["/pool/p2", "/basicserver/s1"]));

        // The driver in the path wins over the parameter.
        let (_, body) = server
            .get_json("/entity/pool?clusto_drivers=basicserver")
            .await;
        assert_eq!(body, json!(["/pool/p1", "/pool/p2"]));
    }

    #[tokio::test]
    async fn list_entities_rejects_invalid_requests() {
        let server = TestServer::new().await;

        let (status, body) = server.get_json("/entity/nondriver").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!("The requested driver \"nondriver\" does not exist"));

        let (status, body) = server.get_json("/entity/?colour=red").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!("Unknown parameter \"colour\""));

        let (status, _) = server.get_json("/entity/?clusto_drivers=nondriver").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn list_entities_expanded() {
        let server = TestServer::new().await;
        server.post_form("/entity/pool", "name=p1").await;

        let (status, body) = server
            .send_with_mode(Method::GET, "/entity/pool", "expanded")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{
                "attrs": [],
                "contents": [],
                "driver": "pool",
                "name": "p1",
                "parents": [],
            }])
        );

        let (status, body) = server
            .send_with_mode(Method::GET, "/entity/pool", "huge")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!("Invalid Clusto-Mode \"huge\", expected \"compact\" or \"expanded\"")
        );
    }

    #[tokio::test]
    async fn create() {
        let server = TestServer::new().await;

        let response = server.post_form("/entity/pool", "name=createpool1").await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert!(response.headers.get("warnings").is_none());
        assert_eq!(response.json(), json!(["/pool/createpool1"]));

        let response = server
            .post_form("/entity/pool", "name=createpool1&name=createpool2")
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert_eq!(
            response.headers["warnings"],
            "Entity(s) /pool/createpool1 already exist(s)"
        );
        assert_eq!(
            response.json(),
            json!(["/pool/createpool1", "/pool/createpool2"])
        );

        // Existing entities keep their driver.
        let response = server
            .post_form("/entity/basicserver", "name=createpool2")
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert_eq!(response.json(), json!(["/pool/createpool2"]));
    }

    #[tokio::test]
    async fn create_repeated_name() {
        let server = TestServer::new().await;

        let response = server.post_form("/entity/pool", "name=dup&name=dup").await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert!(response.headers.get("warnings").is_none());
        assert_eq!(response.json(), json!(["/pool/dup", "/pool/dup"]));

        let response = server.post_form("/entity/pool", "name=dup&name=dup").await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert_eq!(
            response.headers["warnings"],
            "Entity(s) /pool/dup already exist(s)"
        );
    }

    #[tokio::test]
    async fn create_with_mode() {
        let server = TestServer::new().await;

        let response = server
            .send_form_with_mode(Method::POST, "/entity/pool", "name=modepool", "expanded")
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(
            response.json(),
            json!([{
                "attrs": [],
                "contents": [],
                "driver": "pool",
                "name": "modepool",
                "parents": [],
            }])
        );

        let response = server
            .send_form_with_mode(Method::POST, "/entity/pool", "name=modepool", "compact")
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert_eq!(response.json(), json!(["/pool/modepool"]));

        let response = server
            .send_form_with_mode(Method::POST, "/entity/pool", "name=x", "verbose")
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rejects_invalid_requests() {
        let server = TestServer::new().await;

        let response = server.post_form("/entity/nondriver", "name=x").await;
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(
            response.json(),
            json!("Requested driver \"nondriver\" does not exist")
        );

        let response = server.post_form("/entity/pool", "").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json(), json!("Requires HTTP parameter \"name\""));
    }

    #[tokio::test]
    async fn delete() {
        let server = TestServer::new().await;
        server
            .post_form("/entity/basicserver", "name=s1&name=s2")
            .await;
        server.post_form("/entity/pool", "name=p1").await;

        let response = server
            .send_form(Method::DELETE, "/entity/nondriver", "name=s1")
            .await;
        assert_eq!(response.status, StatusCode::CONFLICT);

        let response = server
            .send_form(Method::DELETE, "/entity/basicserver", "name=s1&name=missing")
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.body.is_empty());

        let response = server
            .send_form(Method::DELETE, "/entity/basicserver", "name=s1&name=p1")
            .await;
        assert_eq!(response.status, StatusCode::CONFLICT);

        let (_, body) = server.get_json("/entity/basicserver").await;
        assert_eq!(body, json!(["/basicserver/s1", "/basicserver/s2"]));

        let response = server
            .send_form(Method::DELETE, "/entity/basicserver", "name=s1&name=s2")
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());

        let (_, body) = server.get_json("/entity/basicserver").await;
        assert_eq!(body, json!([]));

        let response = server
            .send_form(Method::DELETE, "/entity/basicserver", "name=s1")
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn show() {
        let server = TestServer::new().await;
        server.post_form("/entity/pool", "name=showpool").await;

        let (status, body) = server.get_json("/entity/pool/showpool").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "attrs": [],
                "contents": [],
                "driver": "pool",
                "name": "showpool",
                "parents": [],
            })
        );

        let (status, body) = server
            .send_with_mode(Method::GET, "/entity/pool/showpool", "compact")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("/pool/showpool"));

        let (status, body) = server.get_json("/entity/pool/nothing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!("Object \"nothing\" not found"));

        let (status, body) = server.get_json("/entity/basicserver/showpool").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body,
            json!("The driver for object \"showpool\" is not \"basicserver\"")
        );
    }

    #[tokio::test]
    async fn insert_and_remove() {
        let server = TestServer::new().await;
        server.post_form("/entity/pool", "name=insertpool").await;
        server
            .post_form("/entity/basicserver", "name=s1&name=s2")
            .await;

        let response = server
            .send_form(Method::PUT, "/entity/pool/insertpool", "device=s1&device=s2")
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.json()["contents"],
            json!(["/basicserver/s1", "/basicserver/s2"])
        );

        // Inserting again does not duplicate the contents.
        let response = server
            .send_form(Method::PUT, "/entity/pool/insertpool", "device=s1")
            .await;
        assert_eq!(
            response.json()["contents"],
            json!(["/basicserver/s1", "/basicserver/s2"])
        );

        let (_, body) = server.get_json("/entity/basicserver/s2").await;
        assert_eq!(body["parents"], json!(["/pool/insertpool"]));

        let response = server
            .send_form(Method::PUT, "/entity/pool/insertpool", "device=a&device=s1&device=b")
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            response.json(),
            json!("Objects a,b do not exist and cannot be inserted into \"insertpool\"")
        );

        let response = server
            .send_form(Method::DELETE, "/entity/pool/insertpool", "device=s1")
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["contents"], json!(["/basicserver/s2"]));

        let response = server
            .send_form(Method::DELETE, "/entity/pool/insertpool", "device=gone")
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            response.json(),
            json!("Objects gone do not exist and cannot be removed from \"insertpool\"")
        );

        let response = server
            .send_form(Method::PUT, "/entity/pool/insertpool", "device=insertpool")
            .await;
        assert_eq!(response.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn insert_and_remove_with_mode() {
        let server = TestServer::new().await;
        server.post_form("/entity/pool", "name=modepool").await;
        server.post_form("/entity/basicserver", "name=s1").await;

        let response = server
            .send_form_with_mode(Method::PUT, "/entity/pool/modepool", "device=s1", "compact")
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json(), json!("/pool/modepool"));

        let response = server
            .send_form_with_mode(Method::DELETE, "/entity/pool/modepool", "device=s1", "compact")
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json(), json!("/pool/modepool"));

        let response = server
            .send_form_with_mode(Method::PUT, "/entity/pool/modepool", "device=s1", "expanded")
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["contents"], json!(["/basicserver/s1"]));

        let response = server
            .send_form_with_mode(Method::DELETE, "/entity/pool/modepool", "device=s1", "expanded")
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["contents"], json!([]));
    }
}
