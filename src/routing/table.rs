//! ルートテーブル
//!
//! メソッドごとに登録順を保ったルート列を持つ。起動時に追記のみで構築し、
//! dispatch中は読み取り専用で共有する。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::common::{Handler, Method, RouteParams};
use crate::error::Error;
use crate::middleware::MiddlewareRef;
use super::matcher::{fill_pattern, match_pattern, shape, validate_pattern};

/// ルートに結び付いた処理
#[derive(Clone)]
pub enum Action {
    /// 解決済みのハンドラー
    Handler(Arc<dyn Handler>),
    /// 登録時に解決できなかった名前（dispatch時に500となる）
    Unresolved(String),
}

impl Action {
    pub fn handler<H: Handler + 'static>(handler: H) -> Self {
        Action::Handler(Arc::new(handler))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Action::Handler(_))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Handler(_) => f.write_str("Action::Handler"),
            Action::Unresolved(name) => write!(f, "Action::Unresolved({:?})", name),
        }
    }
}

/// 登録済みルート（登録後は不変）
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    pattern: String,
    action: Action,
    middleware: Vec<MiddlewareRef>,
    name: Option<String>,
}

impl Route {
    /// 新しいルートを作成（プレースホルダー名の重複はエラー）
    pub fn try_new(
        method: Method,
        pattern: impl Into<String>,
        action: Action,
        middleware: Vec<MiddlewareRef>,
        name: Option<String>,
    ) -> Result<Self, Error> {
        let pattern = pattern.into();
        validate_pattern(&pattern)?;
        Ok(Self {
            method,
            pattern,
            action,
            middleware,
            name,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn middleware(&self) -> &[MiddlewareRef] {
        &self.middleware
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// マッチしたルートと抽出パラメータ
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: RouteParams,
}

/// メソッドごとのルート列
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<Method, Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// ルートを末尾に追加する
    ///
    /// 構造が同一のルートが既にあれば警告する。先に登録された方が常に優先される。
    pub fn add(&mut self, route: Route) {
        let bucket = self.routes.entry(route.method).or_default();

        let new_shape = shape(&route.pattern);
        if let Some(existing) = bucket.iter().find(|r| shape(&r.pattern) == new_shape) {
            warn!(
                "Route {} {} is shadowed by earlier route {}; the earlier registration wins",
                route.method, route.pattern, existing.pattern
            );
        }

        #[cfg(debug_assertions)]
        info!("Registering route {} {}", route.method, route.pattern);
        #[cfg(not(debug_assertions))]
        debug!("Registering route {} {}", route.method, route.pattern);

        bucket.push(route);
    }

    /// 登録順で最初にマッチしたルートを返す
    pub fn find(&self, method: Method, uri: &str) -> Option<RouteMatch<'_>> {
        let bucket = self.routes.get(&method)?;
        bucket.iter().find_map(|route| {
            match_pattern(&route.pattern, uri).map(|params| RouteMatch { route, params })
        })
    }

    /// 指定メソッドのルート列（登録順）
    pub fn routes(&self, method: Method) -> &[Route] {
        self.routes.get(&method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 名前付きルートを検索
    pub fn by_name(&self, name: &str) -> Option<&Route> {
        Method::ALL
            .iter()
            .flat_map(|m| self.routes(*m))
            .find(|r| r.name() == Some(name))
    }

    /// 名前付きルートのURIを生成
    pub fn url_for(&self, name: &str, params: &RouteParams) -> Result<String, Error> {
        let route = self
            .by_name(name)
            .ok_or_else(|| Error::RouteNotFound(format!("no route named '{}'", name)))?;
        fill_pattern(&route.pattern, params)
    }

    /// 登録済みルート総数
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
