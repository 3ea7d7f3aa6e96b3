// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! Attributes of entities.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
};
use clusto::{AttributeFilter, Clusto, Datatype, Entity, validate_key};
use serde::Deserialize;

use crate::{
    ApiError, AppState, Params,
    docs::{EndpointDoc, ModuleDoc},
    util::dumps,
};

pub static DOC: ModuleDoc = ModuleDoc {
    module: module_path!(),
    description: "The attribute application reads and writes attributes of entities. \
Entities are addressed by name, regardless of their driver.",
    endpoints: &[
        EndpointDoc {
            name: "get_attrs",
            text: r#"
Lists the attributes of an entity, optionally narrowed down by key, subkey
and number given as additional path segments.

Example::

    $ ${get} ${server_url}/attribute/clustometa
    [
        {
            "datatype": "string",
            "key": "schemaversion",
            "number": null,
            "subkey": null,
            "value": "1"
        }
    ]
    HTTP: 200
    Content-type: application/json

    $ ${get} ${server_url}/attribute/server1/port/http
"#,
        },
        EndpointDoc {
            name: "add_attr",
            text: r#"
Adds an attribute to an entity.

 *  Requires HTTP parameters ``key`` and ``value``
 *  Optional HTTP parameters ``subkey``, ``number`` and ``datatype``

The datatype is one of ``int``, ``string`` or ``relation``. Without a
datatype, integer values are stored as ``int`` and anything else as
``string``. Relations are given by the name of the related entity.

Example::

    $ ${post} -d 'key=port' -d 'subkey=http' -d 'value=8080' ${server_url}/attribute/server1
    [
        {
            "datatype": "int",
            "key": "port",
            "number": null,
            "subkey": "http",
            "value": 8080
        }
    ]
    HTTP: 201
    Content-type: application/json
"#,
        },
        EndpointDoc {
            name: "set_attr",
            text: r#"
Replaces all matching attributes of an entity with a single one.

 *  Requires HTTP parameter ``value``
 *  Optional HTTP parameter ``datatype``

Example::

    $ ${put} -d 'value=80' ${server_url}/attribute/server1/port/http
    [
        {
            "datatype": "int",
            "key": "port",
            "number": null,
            "subkey": "http",
            "value": 80
        }
    ]
    HTTP: 200
    Content-type: application/json
"#,
        },
        EndpointDoc {
            name: "del_attrs",
            text: r#"
Deletes all matching attributes of an entity and returns the remaining
attributes.

Example::

    $ ${delete} ${server_url}/attribute/server1/port
    []
    HTTP: 200
    Content-type: application/json
"#,
        },
    ],
};

pub(super) fn routes(router: Router<AppState>, prefix: &str) -> Router<AppState> {
    router
        .route(
            &format!("{prefix}/{{name}}"),
            get(get_attrs).post(add_attr),
        )
        .route(
            &format!("{prefix}/{{name}}/{{key}}"),
            get(get_attrs).put(set_attr).delete(del_attrs),
        )
        .route(
            &format!("{prefix}/{{name}}/{{key}}/{{subkey}}"),
            get(get_attrs).put(set_attr).delete(del_attrs),
        )
        .route(
            &format!("{prefix}/{{name}}/{{key}}/{{subkey}}/{{number}}"),
            get(get_attrs).put(set_attr).delete(del_attrs),
        )
}

/// Entity name and attribute selector from the request path.
#[derive(Debug, Deserialize)]
struct AttrPath {
    name: String,
    key: Option<String>,
    subkey: Option<String>,
    number: Option<String>,
}

fn parse_number(number: &str) -> Result<i64, ApiError> {
    number
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Number \"{number}\" is not an integer")))
}

fn parse_datatype(params: &Params) -> Result<Option<Datatype>, ApiError> {
    let Some(datatype) = params.get("datatype") else {
        return Ok(None);
    };
    datatype.parse().map(Some).map_err(Into::into)
}

impl AttrPath {
    fn filter(&self) -> Result<AttributeFilter, ApiError> {
        let Self {
            name: _,
            key,
            subkey,
            number,
        } = self;
        Ok(AttributeFilter {
            key: key.clone(),
            subkey: subkey.clone(),
            number: number.as_deref().map(parse_number).transpose()?,
        })
    }

    async fn load(&self, clusto: &Clusto) -> Result<(Entity, AttributeFilter), ApiError> {
        let filter = self.filter()?;
        if let Some(key) = &filter.key {
            validate_key(key)?;
        }
        let entity = clusto.get_by_name(&self.name, None).await?;
        Ok((entity, filter))
    }
}

async fn get_attrs(
    State(state): State<AppState>,
    Path(path): Path<AttrPath>,
) -> Result<Response, ApiError> {
    let (entity, filter) = path.load(&state.clusto).await?;
    let attrs = state.clusto.attrs(&entity, &filter).await?;
    Ok(dumps(&attrs, StatusCode::OK))
}

async fn add_attr(
    State(state): State<AppState>,
    Path(name): Path<String>,
    params: Params,
) -> Result<Response, ApiError> {
    let AppState { clusto, .. } = &state;
    let key = params.require("key")?;
    validate_key(key)?;
    let raw_value = params.require("value")?;
    let subkey = params.get("subkey");
    let number = params.get("number").map(parse_number).transpose()?;
    let datatype = parse_datatype(&params)?;
    let entity = clusto.get_by_name(&name, None).await?;
    let value = clusto.resolve_value(raw_value, datatype).await?;
    clusto.add_attr(&entity, key, &value, subkey, number).await?;
    let attrs = clusto.attrs(&entity, &AttributeFilter::key(key)).await?;
    Ok(dumps(&attrs, StatusCode::CREATED))
}

async fn set_attr(
    State(state): State<AppState>,
    Path(path): Path<AttrPath>,
    params: Params,
) -> Result<Response, ApiError> {
    let AppState { clusto, .. } = &state;
    let (entity, filter) = path.load(clusto).await?;
    let raw_value = params.require("value")?;
    let datatype = parse_datatype(&params)?;
    let value = clusto.resolve_value(raw_value, datatype).await?;
    let AttributeFilter {
        key: Some(key),
        subkey,
        number,
    } = filter
    else {
        return Err(ApiError::missing_param("key"));
    };
    clusto
        .set_attr(&entity, &key, &value, subkey.as_deref(), number)
        .await?;
    let attrs = clusto.attrs(&entity, &AttributeFilter::key(key)).await?;
    Ok(dumps(&attrs, StatusCode::OK))
}

async fn del_attrs(
    State(state): State<AppState>,
    Path(path): Path<AttrPath>,
) -> Result<Response, ApiError> {
    let AppState { clusto, .. } = &state;
    let (entity, filter) = path.load(clusto).await?;
    let deleted_count = clusto.del_attrs(&entity, &filter).await?;
    log::debug!(
        "Deleted {deleted_count} attributes of {path}",
        path = entity.path()
    );
    let attrs = clusto.attrs(&entity, &AttributeFilter::default()).await?;
    Ok(dumps(&attrs, StatusCode::OK))
}
