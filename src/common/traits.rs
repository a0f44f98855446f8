//! コアトレイト定義（Handler、Middleware）と継続 `Next`

use std::collections::HashMap;
use std::fmt;

use crate::error::Error;
use super::request::Request;
use super::response::Response;

/// パスから抽出されたパラメータ
pub type RouteParams = HashMap<String, String>;

/// ハンドラーの特性
pub trait Handler: Send + Sync {
    /// リクエストと抽出済みパラメータを受け取りレスポンスを返す
    fn call(&self, req: &Request, params: &RouteParams) -> Result<Response, Error>;
}

/// ミドルウェアの特性
///
/// `next.run(req)` を呼べば内側へ処理が進む。呼ばずに返せばそこで打ち切られ、
/// 内側のミドルウェアとハンドラーは実行されない。
pub trait Middleware: Send + Sync {
    fn handle(&self, req: &Request, next: Next<'_>) -> Result<Response, Error>;
}

/// チェーン上の残りの処理を表す一度きりの継続
pub struct Next<'a> {
    run: Box<dyn FnOnce(&Request) -> Result<Response, Error> + 'a>,
}

impl<'a> Next<'a> {
    /// クロージャから継続を作成
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&Request) -> Result<Response, Error> + 'a,
    {
        Self { run: Box::new(f) }
    }

    /// 内側の処理を実行
    pub fn run(self, req: &Request) -> Result<Response, Error> {
        (self.run)(req)
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

/// 関数をハンドラーとして扱うためのラッパー
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Request, &RouteParams) -> Result<Response, Error> + Send + Sync,
{
    fn call(&self, req: &Request, params: &RouteParams) -> Result<Response, Error> {
        (self.0)(req, params)
    }
}

/// クロージャからハンドラーを作成
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Request, &RouteParams) -> Result<Response, Error> + Send + Sync,
{
    FnHandler(f)
}

/// 関数をミドルウェアとして扱うためのラッパー
pub struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&Request, Next<'a>) -> Result<Response, Error> + Send + Sync,
{
    fn handle(&self, req: &Request, next: Next<'_>) -> Result<Response, Error> {
        (self.0)(req, next)
    }
}

/// クロージャからミドルウェアを作成
pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&Request, Next<'a>) -> Result<Response, Error> + Send + Sync,
{
    FnMiddleware(f)
}
