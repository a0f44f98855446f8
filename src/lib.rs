//! RouteBridge: 同期ディスパッチ型のHTTPルーティングエンジン
//!
//! 起動時に `RouterBuilder` でルートを登録し、`build()` で不変の `Router` を得る。
//! `Router` は `Send + Sync` で、複数のリクエストから同時に参照できる。

pub mod common;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod routing;

#[cfg(feature = "cgi")]
pub mod cgi;

use log::warn;

pub use common::*;
pub use error::*;
pub use middleware::MiddlewareRef;
pub use routing::{
    action_name, parse_routes, read_route_file, Action, ActionRegistry, ControllerMethod, Route, RouteEntry,
    RouteMatch, RouteTable,
};

/// `resource` が登録するアクション（メソッド、パス接尾辞、アクション名）
const RESOURCE_ACTIONS: [(Method, &str, &str); 5] = [
    (Method::GET, "", "index"),
    (Method::GET, "/{id}", "show"),
    (Method::POST, "", "store"),
    (Method::PUT, "/{id}", "update"),
    (Method::DELETE, "/{id}", "destroy"),
];

/// グループのプレフィックスとパターンを連結する
fn join_path(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if pattern.is_empty() || pattern == "/" {
        return if prefix.is_empty() { "/".to_string() } else { prefix.to_string() };
    }
    if pattern.starts_with('/') {
        format!("{}{}", prefix, pattern)
    } else {
        format!("{}/{}", prefix, pattern)
    }
}

/// ルーターを構築するためのビルダー
#[derive(Debug, Default)]
pub struct RouterBuilder {
    table: RouteTable,
    global: Vec<MiddlewareRef>,
    registry: ActionRegistry,
    prefix: String,
    group_middleware: Vec<MiddlewareRef>,
    pending_error: Option<Error>,
}

impl RouterBuilder {
    /// 新しいRouterBuilderインスタンスを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 既存のレジストリを使って作成
    pub fn with_registry(registry: ActionRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// 名前解決に使うレジストリ
    pub fn registry_mut(&mut self) -> &mut ActionRegistry {
        &mut self.registry
    }

    /// ルートを末尾に追加
    ///
    /// 現在のグループのプレフィックスとミドルウェアが適用される。
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        action: Action,
        middleware: Vec<MiddlewareRef>,
        name: Option<String>,
    ) -> Result<&mut Self, Error> {
        let pattern = join_path(&self.prefix, pattern);
        let stack: Vec<MiddlewareRef> = self
            .group_middleware
            .iter()
            .cloned()
            .chain(middleware)
            .collect();
        let route = Route::try_new(method, pattern, action, stack, name)?;
        self.table.add(route);
        Ok(self)
    }

    /// ハンドラーを登録（パターンのエラーは `build()` で返される）
    pub fn route<H: Handler + 'static>(&mut self, method: Method, pattern: &str, handler: H) -> &mut Self {
        let result = self
            .add_route(method, pattern, Action::handler(handler), Vec::new(), None)
            .map(|_| ());
        if let Err(e) = result {
            self.defer_error(e);
        }
        self
    }

    pub fn get<F>(&mut self, pattern: &str, f: F) -> &mut Self
    where
        F: Fn(&Request, &RouteParams) -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.route(Method::GET, pattern, handler_fn(f))
    }

    pub fn post<F>(&mut self, pattern: &str, f: F) -> &mut Self
    where
        F: Fn(&Request, &RouteParams) -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.route(Method::POST, pattern, handler_fn(f))
    }

    pub fn put<F>(&mut self, pattern: &str, f: F) -> &mut Self
    where
        F: Fn(&Request, &RouteParams) -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.route(Method::PUT, pattern, handler_fn(f))
    }

    pub fn patch<F>(&mut self, pattern: &str, f: F) -> &mut Self
    where
        F: Fn(&Request, &RouteParams) -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.route(Method::PATCH, pattern, handler_fn(f))
    }

    pub fn delete<F>(&mut self, pattern: &str, f: F) -> &mut Self
    where
        F: Fn(&Request, &RouteParams) -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.route(Method::DELETE, pattern, handler_fn(f))
    }

    /// グローバルミドルウェアを追加（登録順に外側から実行される）
    pub fn middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        self.global.push(middleware);
        self
    }

    /// 名前付きミドルウェアをレジストリに登録
    pub fn named_middleware(&mut self, name: &str, middleware: MiddlewareRef) -> &mut Self {
        self.registry.register_middleware(name, middleware);
        self
    }

    /// コントローラーのメソッドをレジストリに登録
    pub fn controller<C>(&mut self, name: &str, methods: &[(&str, ControllerMethod<C>)]) -> &mut Self
    where
        C: Default + Send + Sync + 'static,
    {
        self.registry.register_controller(name, methods);
        self
    }

    /// 設定レコードからルートを一括登録
    ///
    /// 未知のメソッドは警告してスキップ、未登録のハンドラー名は `Action::Unresolved`
    /// として登録する。未知のミドルウェア名は `Error::ConfigLoad` で失敗する。
    pub fn load_routes(&mut self, entries: &[RouteEntry]) -> Result<&mut Self, Error> {
        for entry in entries {
            let method: Method = match entry.method.parse() {
                Ok(m) => m,
                Err(_) => {
                    warn!(
                        "Skipping route {} with unsupported method '{}'",
                        entry.path, entry.method
                    );
                    continue;
                }
            };

            let middleware = entry
                .middleware
                .iter()
                .map(|name| self.registry.resolve_middleware(name))
                .collect::<Result<Vec<_>, Error>>()?;
            let action = self.registry.resolve_action(&entry.handler);

            self.add_route(method, &entry.path, action, middleware, entry.name.clone())?;
        }
        Ok(self)
    }

    /// プレフィックスとミドルウェアを共有するルート群を登録
    ///
    /// グループのミドルウェアはルート固有のミドルウェアより外側で実行される。
    /// 入れ子にした場合はプレフィックスとミドルウェアが累積する。
    pub fn group<F>(&mut self, prefix: &str, middleware: Vec<MiddlewareRef>, f: F) -> &mut Self
    where
        F: FnOnce(&mut RouterBuilder),
    {
        let nested = join_path(&self.prefix, prefix);
        let saved_prefix = std::mem::replace(&mut self.prefix, nested);
        let saved_len = self.group_middleware.len();
        self.group_middleware.extend(middleware);

        f(self);

        self.group_middleware.truncate(saved_len);
        self.prefix = saved_prefix;
        self
    }

    /// リソースルートを登録
    ///
    /// `controller` はレジストリに登録済みのコントローラー名で、
    /// `index/show/store/update/destroy` の各アクションを割り当てる。
    /// ルート名は `<path>.<action>`（例: `users.show`）。
    pub fn resource(&mut self, path: &str, controller: &str) -> &mut Self {
        let base = path.trim_matches('/').replace('/', ".");
        for (method, suffix, action) in RESOURCE_ACTIONS {
            let handler = self.registry.resolve_action(&action_name(controller, action));
            let pattern = format!("/{}{}", path.trim_matches('/'), suffix);
            let name = format!("{}.{}", base, action);
            let result = self
                .add_route(method, &pattern, handler, Vec::new(), Some(name))
                .map(|_| ());
            if let Err(e) = result {
                self.defer_error(e);
            }
        }
        self
    }

    fn defer_error(&mut self, error: Error) {
        warn!("Route registration failed: {}", error);
        if self.pending_error.is_none() {
            self.pending_error = Some(error);
        }
    }

    /// ルーターを確定する
    pub fn build(self) -> Result<Router, Error> {
        if let Some(e) = self.pending_error {
            return Err(e);
        }
        Ok(Router {
            table: self.table,
            global: self.global,
        })
    }
}

/// 登録済みのルートとグローバルミドルウェアを保持する不変のルーター
#[derive(Debug)]
pub struct Router {
    table: RouteTable,
    global: Vec<MiddlewareRef>,
}

impl Router {
    /// 新しいRouterBuilderインスタンスを作成
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// 登録順で最初にマッチしたルートを返す
    pub fn find(&self, method: Method, uri: &str) -> Option<RouteMatch<'_>> {
        self.table.find(method, uri)
    }

    /// 名前付きルートのURIを生成
    pub fn url_for(&self, name: &str, params: &RouteParams) -> Result<String, Error> {
        self.table.url_for(name, params)
    }

    /// 指定メソッドのルート列
    pub fn routes(&self, method: Method) -> &[Route] {
        self.table.routes(method)
    }

    /// グローバルミドルウェア
    pub fn global_middleware(&self) -> &[MiddlewareRef] {
        &self.global
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
