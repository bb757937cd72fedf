//! In-memory stand-in for a Weaviate instance's `/weaviate/v1` surface.
//!
//! Things, actions and keys live in process memory. Status codes follow the
//! real service: creates answer 202, deletes 204, everything else 200.
//! Every request must carry an `X-API-KEY` belonging to a known key.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const DEFAULT_API_KEY: &str = "mock-api-key";

/// Stored thing, action or key with its insertion order.
#[derive(Clone, Debug)]
struct Entry {
    seq: u64,
    body: Value,
}

#[derive(Clone, Debug)]
struct Key {
    token: String,
    parent: Option<Uuid>,
    body: Value,
}

#[derive(Debug, Default)]
pub struct Store {
    seq: u64,
    things: HashMap<Uuid, Entry>,
    actions: HashMap<Uuid, Entry>,
    keys: HashMap<Uuid, Key>,
}

impl Store {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn key_by_token(&self, token: &str) -> Option<Uuid> {
        self.keys
            .iter()
            .find(|(_, key)| key.token == token)
            .map(|(id, _)| *id)
    }

    fn children_of(&self, parent: Uuid) -> Vec<Uuid> {
        let mut children: Vec<Uuid> = self
            .keys
            .iter()
            .filter(|(_, key)| key.parent == Some(parent))
            .map(|(id, _)| *id)
            .collect();
        children.sort();
        children
    }

    fn key_json(&self, id: Uuid) -> Option<Value> {
        let key = self.keys.get(&id)?;
        let mut body = key.body.clone();
        if let Value::Object(map) = &mut body {
            map.insert("keyId".to_string(), json!(id));
            map.insert(
                "parent".to_string(),
                key.parent
                    .map(|p| json!({"$cref": p, "type": "Key"}))
                    .unwrap_or(Value::Null),
            );
        }
        Some(body)
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Id of the key that authenticated the current request.
#[derive(Clone, Copy, Debug)]
struct Caller(Uuid);

/// Router accepting [`DEFAULT_API_KEY`] as the root key.
pub fn app() -> Router {
    app_with_key(DEFAULT_API_KEY)
}

pub fn app_with_key(api_key: &str) -> Router {
    let mut store = Store::default();
    store.keys.insert(
        Uuid::new_v4(),
        Key {
            token: api_key.to_string(),
            parent: None,
            body: json!({"read": true, "write": true, "delete": true, "execute": true}),
        },
    );
    let db: Db = Arc::new(RwLock::new(store));

    let api = Router::new()
        .route("/things", get(list_things).post(create_thing))
        .route("/things/validate", post(validate_thing))
        .route(
            "/things/{id}",
            get(get_thing).patch(patch_thing).put(put_thing).delete(delete_thing),
        )
        .route("/things/{id}/actions", get(list_thing_actions))
        .route("/actions", post(create_action))
        .route("/actions/validate", post(validate_action))
        .route("/actions/{id}", get(get_action).delete(delete_action))
        .route("/action/{id}", patch(patch_action))
        .route("/graphql", post(graphql))
        .route("/meta", post(meta))
        .route("/keys", post(create_key))
        .route("/keys/me", get(get_my_key))
        .route("/keys/me/children", get(get_my_key_children))
        .route("/keys/{id}", get(get_key).delete(delete_key))
        .route("/keys/{id}/children", get(get_key_children))
        .route_layer(middleware::from_fn_with_state(db.clone(), authenticate))
        .with_state(db);

    Router::new().nest("/weaviate/v1", api)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_key(listener, DEFAULT_API_KEY).await
}

pub async fn run_with_key(listener: TcpListener, api_key: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_key(api_key)).await
}

async fn authenticate(State(db): State<Db>, mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let caller = db.read().await.key_by_token(token).ok_or(StatusCode::UNAUTHORIZED)?;
    request.extensions_mut().insert(Caller(caller));
    Ok(next.run(request).await)
}

// --- things ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub max_results: usize,
    #[serde(default)]
    pub page: usize,
}

async fn list_things(State(db): State<Db>, Query(params): Query<ListParams>) -> Json<Value> {
    let store = db.read().await;
    let mut entries: Vec<&Entry> = store.things.values().collect();
    entries.sort_by_key(|e| e.seq);
    let total = entries.len();
    let things: Vec<Value> = if params.max_results == 0 {
        entries.into_iter().map(|e| e.body.clone()).collect()
    } else {
        entries
            .into_iter()
            .skip(params.page.saturating_mul(params.max_results))
            .take(params.max_results)
            .map(|e| e.body.clone())
            .collect()
    };
    Json(json!({"things": things, "totalResults": total}))
}

async fn create_thing(State(db): State<Db>, Json(body): Json<Value>) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let mut body = valid_thing(body)?;
    let id = Uuid::new_v4();
    body.insert("thingId".to_string(), json!(id));
    let body = Value::Object(body);

    let mut store = db.write().await;
    let seq = store.next_seq();
    store.things.insert(id, Entry { seq, body: body.clone() });
    Ok((StatusCode::ACCEPTED, Json(body)))
}

async fn validate_thing(Json(body): Json<Value>) -> Result<StatusCode, StatusCode> {
    valid_thing(body).map(|_| StatusCode::OK)
}

async fn get_thing(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Value>, StatusCode> {
    let store = db.read().await;
    store.things.get(&id).map(|e| Json(e.body.clone())).ok_or(StatusCode::NOT_FOUND)
}

async fn patch_thing(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(ops): Json<Vec<PatchOperation>>,
) -> Result<Json<Value>, StatusCode> {
    let mut store = db.write().await;
    let entry = store.things.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    let patched = apply_patch(&entry.body, &ops)?;
    let mut patched = valid_thing(patched)?;
    patched.insert("thingId".to_string(), json!(id));
    entry.body = Value::Object(patched);
    Ok(Json(entry.body.clone()))
}

async fn put_thing(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let mut body = valid_thing(body)?;
    body.insert("thingId".to_string(), json!(id));
    let mut store = db.write().await;
    let entry = store.things.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    entry.body = Value::Object(body);
    Ok(Json(entry.body.clone()))
}

async fn delete_thing(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<StatusCode, StatusCode> {
    let mut store = db.write().await;
    store.things.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

async fn list_thing_actions(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Value>, StatusCode> {
    let store = db.read().await;
    if !store.things.contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let id = id.to_string();
    let mut entries: Vec<&Entry> = store
        .actions
        .values()
        .filter(|e| {
            ["subject", "object"]
                .iter()
                .any(|side| e.body["things"][side]["$cref"].as_str() == Some(id.as_str()))
        })
        .collect();
    entries.sort_by_key(|e| e.seq);
    let actions: Vec<Value> = entries.into_iter().map(|e| e.body.clone()).collect();
    Ok(Json(json!({"totalResults": actions.len(), "actions": actions})))
}

fn valid_thing(body: Value) -> Result<Map<String, Value>, StatusCode> {
    let Value::Object(map) = body else {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    };
    if !map.get("@class").is_some_and(Value::is_string) || !map.get("schema").is_some_and(Value::is_object) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(map)
}

// --- actions ---

async fn create_action(State(db): State<Db>, Json(body): Json<Value>) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let mut body = valid_action(body)?;
    let id = Uuid::new_v4();
    body.insert("actionId".to_string(), json!(id));
    let body = Value::Object(body);

    let mut store = db.write().await;
    let seq = store.next_seq();
    store.actions.insert(id, Entry { seq, body: body.clone() });
    Ok((StatusCode::ACCEPTED, Json(body)))
}

async fn validate_action(Json(body): Json<Value>) -> Result<StatusCode, StatusCode> {
    valid_action(body).map(|_| StatusCode::OK)
}

async fn get_action(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Value>, StatusCode> {
    let store = db.read().await;
    store.actions.get(&id).map(|e| Json(e.body.clone())).ok_or(StatusCode::NOT_FOUND)
}

async fn patch_action(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(ops): Json<Vec<PatchOperation>>,
) -> Result<Json<Value>, StatusCode> {
    let mut store = db.write().await;
    let entry = store.actions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    let patched = apply_patch(&entry.body, &ops)?;
    let mut patched = valid_action(patched)?;
    patched.insert("actionId".to_string(), json!(id));
    entry.body = Value::Object(patched);
    Ok(Json(entry.body.clone()))
}

async fn delete_action(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<StatusCode, StatusCode> {
    let mut store = db.write().await;
    store.actions.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

fn valid_action(body: Value) -> Result<Map<String, Value>, StatusCode> {
    let map = valid_thing(body)?;
    let things = map.get("things").ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    let linked = ["subject", "object"]
        .iter()
        .all(|side| things[side]["$cref"].is_string());
    if !linked {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(map)
}

// --- patch ---

#[derive(Debug, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

/// Apply `ops` to a copy of `target`; the original is untouched on failure.
fn apply_patch(target: &Value, ops: &[PatchOperation]) -> Result<Value, StatusCode> {
    let mut doc = target.clone();
    for op in ops {
        match op.op.as_str() {
            "replace" => {
                let slot = doc.pointer_mut(&op.path).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
                *slot = op.value.clone();
            }
            "add" => {
                let (parent, key) = split_pointer(&op.path)?;
                parent_object(&mut doc, parent)?.insert(key, op.value.clone());
            }
            "remove" => {
                let (parent, key) = split_pointer(&op.path)?;
                parent_object(&mut doc, parent)?
                    .remove(&key)
                    .ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
            }
            _ => return Err(StatusCode::UNPROCESSABLE_ENTITY),
        }
    }
    Ok(doc)
}

fn split_pointer(path: &str) -> Result<(&str, String), StatusCode> {
    let (parent, key) = path.rsplit_once('/').ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    Ok((parent, key.replace("~1", "/").replace("~0", "~")))
}

fn parent_object<'a>(doc: &'a mut Value, pointer: &str) -> Result<&'a mut Map<String, Value>, StatusCode> {
    doc.pointer_mut(pointer)
        .and_then(Value::as_object_mut)
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)
}

// --- graphql ---

#[derive(Debug, Deserialize)]
pub struct GraphQLQuery {
    pub query: String,
}

/// Answers `listThings(first:N schema:"prop:value", class:"Class")`.
/// Anything else gets a GraphQL error payload with status 200.
async fn graphql(State(db): State<Db>, Json(body): Json<GraphQLQuery>) -> Json<Value> {
    let Some(filter) = ListThingsFilter::parse(&body.query) else {
        return Json(json!({"errors": [{"message": "unsupported query"}]}));
    };

    let store = db.read().await;
    let mut entries: Vec<(&Uuid, &Entry)> = store
        .things
        .iter()
        .filter(|(_, e)| filter.matches(&e.body))
        .collect();
    entries.sort_by_key(|(_, e)| e.seq);
    let things: Vec<Value> = entries
        .into_iter()
        .take(filter.first.unwrap_or(usize::MAX))
        .map(|(id, _)| json!({"uuid": id}))
        .collect();
    Json(json!({"data": {"listThings": {"things": things}}}))
}

#[derive(Debug, Default, PartialEq)]
pub struct ListThingsFilter {
    pub first: Option<usize>,
    pub class: Option<String>,
    pub property: Option<(String, String)>,
}

impl ListThingsFilter {
    pub fn parse(query: &str) -> Option<Self> {
        let start = query.find("listThings(")? + "listThings(".len();
        let args = &query[start..];
        let mut filter = ListThingsFilter::default();

        if let Some(rest) = arg_after(args, "first:") {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            filter.first = digits.parse().ok();
        }
        if let Some(rest) = arg_after(args, "class:") {
            filter.class = Some(string_literal(rest)?);
        }
        if let Some(rest) = arg_after(args, "schema:") {
            let raw = string_literal(rest)?;
            let (name, value) = raw.split_once(':')?;
            filter.property = Some((name.to_string(), value.to_string()));
        }
        Some(filter)
    }

    fn matches(&self, thing: &Value) -> bool {
        if let Some(class) = &self.class {
            if thing["@class"].as_str() != Some(class.as_str()) {
                return false;
            }
        }
        if let Some((name, value)) = &self.property {
            return match &thing["schema"][name] {
                Value::String(s) => s == value,
                Value::Null => false,
                other => other.to_string() == *value,
            };
        }
        true
    }
}

/// Text following `name` when it appears as an argument name outside any
/// string literal.
fn arg_after<'a>(args: &'a str, name: &str) -> Option<&'a str> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in args.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ')' => return None,
            _ if args[i..].starts_with(name) => return Some(&args[i + name.len()..]),
            _ => {}
        }
    }
    None
}

/// Decode the GraphQL string literal at the start of `rest`.
fn string_literal(rest: &str) -> Option<String> {
    let mut chars = rest.trim_start().chars();
    if chars.next()? != '"' {
        return None;
    }
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out),
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'b' => out.push('\u{08}'),
                'f' => out.push('\u{0C}'),
                'u' => {
                    let hex: String = chars.by_ref().take(4).collect();
                    out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                }
                other => out.push(other),
            },
            c => out.push(c),
        }
    }
    None
}

// --- meta ---

async fn meta(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    Json(json!({
        "hostname": "mock-server",
        "thingsCount": store.things.len(),
        "actionsCount": store.actions.len(),
        "thingsSchema": {},
        "actionsSchema": {},
    }))
}

// --- keys ---

async fn create_key(
    State(db): State<Db>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    if !body.is_object() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let id = Uuid::new_v4();
    let token = Uuid::new_v4().to_string();
    let mut store = db.write().await;
    store.keys.insert(
        id,
        Key {
            token: token.clone(),
            parent: Some(caller),
            body,
        },
    );
    let mut created = store.key_json(id).ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    created["token"] = json!(token);
    Ok((StatusCode::ACCEPTED, Json(created)))
}

async fn get_key(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Value>, StatusCode> {
    db.read().await.key_json(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Removes the key and every key below it.
async fn delete_key(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<StatusCode, StatusCode> {
    let mut store = db.write().await;
    if !store.keys.contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let mut pending = vec![id];
    while let Some(next) = pending.pop() {
        pending.extend(store.children_of(next));
        store.keys.remove(&next);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn get_key_children(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Value>, StatusCode> {
    let store = db.read().await;
    if !store.keys.contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(children_json(&store, id)))
}

async fn get_my_key(State(db): State<Db>, Extension(Caller(caller)): Extension<Caller>) -> Result<Json<Value>, StatusCode> {
    db.read().await.key_json(caller).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_my_key_children(State(db): State<Db>, Extension(Caller(caller)): Extension<Caller>) -> Json<Value> {
    Json(children_json(&*db.read().await, caller))
}

fn children_json(store: &Store, parent: Uuid) -> Value {
    let children: Vec<Value> = store
        .children_of(parent)
        .into_iter()
        .map(|id| json!({"$cref": id, "type": "Key"}))
        .collect();
    json!({"children": children})
}
