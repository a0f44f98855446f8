//! ミドルウェアチェーンの構築
//!
//! 終端の継続（ハンドラー呼び出し）から始め、`reverse(global ++ route)` の順に
//! 各ミドルウェアで包んでいく。結果としてグローバルミドルウェアが最も外側になる。

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::common::{Handler, Middleware, Next, RouteParams};

type MiddlewareFactory = Arc<dyn Fn() -> Box<dyn Middleware> + Send + Sync>;

/// ルートやグローバル設定に登録されるミドルウェア参照
#[derive(Clone)]
pub enum MiddlewareRef {
    /// ステートレスで使い回せるインスタンス
    Shared(Arc<dyn Middleware>),
    /// dispatchごとに生成するファクトリ
    Factory(MiddlewareFactory),
}

impl MiddlewareRef {
    /// 共有インスタンスとして登録
    pub fn shared<M: Middleware + 'static>(middleware: M) -> Self {
        MiddlewareRef::Shared(Arc::new(middleware))
    }

    /// ファクトリとして登録
    pub fn factory<M, F>(factory: F) -> Self
    where
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        MiddlewareRef::Factory(Arc::new(move || Box::new(factory()) as Box<dyn Middleware>))
    }

    /// `Default` で毎回生成するミドルウェア
    pub fn per_request<M: Middleware + Default + 'static>() -> Self {
        Self::factory(M::default)
    }

    /// チェーン構築時に実体を解決する
    pub fn instantiate(&self) -> Arc<dyn Middleware> {
        match self {
            MiddlewareRef::Shared(m) => Arc::clone(m),
            MiddlewareRef::Factory(f) => Arc::from(f()),
        }
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareRef::Shared(_) => f.write_str("MiddlewareRef::Shared"),
            MiddlewareRef::Factory(_) => f.write_str("MiddlewareRef::Factory"),
        }
    }
}

/// ハンドラーを呼び出す終端の継続
pub fn terminal<'a>(handler: &'a dyn Handler, params: &'a RouteParams) -> Next<'a> {
    Next::new(move |req| handler.call(req, params))
}

/// ミドルウェア列で終端の継続を包む（先頭が最も外側）
pub fn compose<'a>(stack: Vec<Arc<dyn Middleware>>, terminal: Next<'a>) -> Next<'a> {
    stack
        .into_iter()
        .rev()
        .fold(terminal, |inner, middleware| {
            Next::new(move |req| middleware.handle(req, inner))
        })
}

/// グローバルとルート固有のミドルウェアを解決してチェーンを構築する
pub fn build_chain<'a>(
    global: &[MiddlewareRef],
    route: &[MiddlewareRef],
    terminal: Next<'a>,
) -> Next<'a> {
    let stack: Vec<Arc<dyn Middleware>> = global
        .iter()
        .chain(route.iter())
        .map(MiddlewareRef::instantiate)
        .collect();
    debug!(
        "Building middleware chain: {} global, {} route",
        global.len(),
        route.len()
    );
    compose(stack, terminal)
}
