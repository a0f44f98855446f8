//! サンプルアプリケーションの実装
//!
//! CGIバイナリが提供するハンドラ、コントローラ、ミドルウェア。

use std::path::Path;

use log::info;
use serde_json::{json, Value};

use routebridge::{
    read_route_file, Error, Handler, Method, Middleware, MiddlewareRef, Next, Request, Response, RouteParams,
    Router, RouterBuilder,
};

/// シンプルな Hello World ハンドラ
pub struct HelloHandler;

impl Handler for HelloHandler {
    fn call(&self, _req: &Request, _params: &RouteParams) -> Result<Response, Error> {
        info!("Handling Hello request");
        Response::ok().json(&json!({
            "message": "Hello from RouteBridge CGI",
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }
}

/// リクエスト情報をエコーするハンドラ
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn call(&self, req: &Request, _params: &RouteParams) -> Result<Response, Error> {
        info!("Handling Echo request");
        let body = match std::str::from_utf8(req.raw_body()) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::String(format!("<binary data of {} bytes>", req.raw_body().len())),
        };
        Response::ok().json(&json!({
            "method": req.method().as_str(),
            "path": req.uri(),
            "params": req.all(),
            "body": body,
        }))
    }
}

/// パニックテスト用ハンドラ
pub struct PanicHandler;

impl Handler for PanicHandler {
    fn call(&self, _req: &Request, _params: &RouteParams) -> Result<Response, Error> {
        info!("Handling Panic request - this will panic!");
        panic!("Test panic from handler");
    }
}

/// ユーザーリソースのコントローラ
#[derive(Default)]
pub struct UserController;

impl UserController {
    pub fn index(&self, _req: &Request, _params: &RouteParams) -> Result<Response, Error> {
        Response::ok().json(&json!({ "users": [] }))
    }

    pub fn show(&self, _req: &Request, params: &RouteParams) -> Result<Response, Error> {
        Response::ok().json(&json!({ "id": params.get("id") }))
    }

    pub fn store(&self, req: &Request, _params: &RouteParams) -> Result<Response, Error> {
        Response::create_json(&json!({ "created": req.all() }), 201, &[])
    }

    pub fn update(&self, _req: &Request, params: &RouteParams) -> Result<Response, Error> {
        let id = params.get("id").map(String::as_str).unwrap_or_default();
        Ok(Response::text(200, format!("Updated {}", id)))
    }

    pub fn destroy(&self, _req: &Request, _params: &RouteParams) -> Result<Response, Error> {
        Ok(Response::new(204))
    }
}

/// リクエストの開始と結果を記録するミドルウェア
#[derive(Default)]
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn handle(&self, req: &Request, next: Next<'_>) -> Result<Response, Error> {
        info!("--> {} {}", req.method(), req.uri());
        let result = next.run(req);
        match &result {
            Ok(res) => info!("<-- {} {} {}", req.method(), req.uri(), res.status()),
            Err(e) => info!("<-- {} {} failed: {}", req.method(), req.uri(), e),
        }
        result
    }
}

/// サンプルアプリケーションのルートを登録する
pub fn register(builder: &mut RouterBuilder) {
    builder
        .controller::<UserController>(
            "UserController",
            &[
                ("index", UserController::index),
                ("show", UserController::show),
                ("store", UserController::store),
                ("update", UserController::update),
                ("destroy", UserController::destroy),
            ],
        )
        .named_middleware("log", MiddlewareRef::shared(RequestLogger))
        .middleware(MiddlewareRef::per_request::<RequestLogger>())
        .route(Method::GET, "/", HelloHandler)
        .route(Method::GET, "/echo", EchoHandler)
        .route(Method::POST, "/echo", EchoHandler)
        .route(Method::GET, "/panic", PanicHandler)
        .resource("/users", "UserController");
}

/// ルーターを構築する（ルートファイルがあれば追加で読み込む）
pub fn build_router(route_file: Option<&Path>) -> Result<Router, Error> {
    let mut builder = Router::builder();
    register(&mut builder);
    if let Some(path) = route_file {
        let entries = read_route_file(path)?;
        info!("Loading {} routes from {}", entries.len(), path.display());
        builder.load_routes(&entries)?;
    }
    builder.build()
}
