//! ハンドラーとミドルウェアの名前解決
//!
//! 設定ファイルに書かれた `"Controller@method"` 形式の名前やミドルウェア名を、
//! 登録時に一度だけ実体へ解決する。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::warn;

use crate::common::{handler_fn, Handler, Request, Response, RouteParams};
use crate::error::Error;
use crate::middleware::MiddlewareRef;
use super::table::Action;

/// コントローラーのアクションメソッド
pub type ControllerMethod<C> = fn(&C, &Request, &RouteParams) -> Result<Response, Error>;

/// 呼び出しごとにコントローラーを `Default` で生成してメソッドを実行するハンドラー
struct ControllerAction<C> {
    method: ControllerMethod<C>,
}

impl<C> Handler for ControllerAction<C>
where
    C: Default + Send + Sync + 'static,
{
    fn call(&self, req: &Request, params: &RouteParams) -> Result<Response, Error> {
        let controller = C::default();
        (self.method)(&controller, req, params)
    }
}

/// `Controller@method` 形式の名前を組み立てる
pub fn action_name(controller: &str, method: &str) -> String {
    format!("{}@{}", controller, method)
}

/// 名前からハンドラー・ミドルウェアを引くレジストリ
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
    middleware: HashMap<String, MiddlewareRef>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 名前付きハンドラーを登録
    pub fn register_handler<H: Handler + 'static>(&mut self, name: impl Into<String>, handler: H) -> &mut Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// クロージャを名前付きハンドラーとして登録
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Request, &RouteParams) -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.register_handler(name, handler_fn(f))
    }

    /// コントローラーの各メソッドを `Controller@method` として登録
    pub fn register_controller<C>(
        &mut self,
        controller: &str,
        methods: &[(&str, ControllerMethod<C>)],
    ) -> &mut Self
    where
        C: Default + Send + Sync + 'static,
    {
        for (method, f) in methods {
            self.register_handler(action_name(controller, method), ControllerAction::<C> { method: *f });
        }
        self
    }

    /// 名前付きミドルウェアを登録
    pub fn register_middleware(&mut self, name: impl Into<String>, middleware: MiddlewareRef) -> &mut Self {
        self.middleware.insert(name.into(), middleware);
        self
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// ハンドラー名を解決する（未登録なら `Action::Unresolved`）
    pub fn resolve_action(&self, name: &str) -> Action {
        match self.handlers.get(name) {
            Some(handler) => Action::Handler(Arc::clone(handler)),
            None => {
                warn!("Handler '{}' is not registered; the route will answer 500", name);
                Action::Unresolved(name.to_string())
            }
        }
    }

    /// ミドルウェア名を解決する
    pub fn resolve_middleware(&self, name: &str) -> Result<MiddlewareRef, Error> {
        self.middleware
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ConfigLoad(format!("unknown middleware '{}'", name)))
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        let mut middleware: Vec<&String> = self.middleware.keys().collect();
        middleware.sort();
        f.debug_struct("ActionRegistry")
            .field("handlers", &handlers)
            .field("middleware", &middleware)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::middleware_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    struct CounterController;

    impl Default for CounterController {
        fn default() -> Self {
            CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            CounterController
        }
    }

    impl CounterController {
        fn show(&self, _req: &Request, params: &RouteParams) -> Result<Response, Error> {
            Ok(Response::text(200, format!("show {}", params["id"])))
        }
    }

    #[test]
    fn test_controller_is_constructed_per_call() {
        let mut registry = ActionRegistry::new();
        registry.register_controller::<CounterController>("CounterController", &[("show", CounterController::show)]);
        assert!(registry.has_handler("CounterController@show"));

        let Action::Handler(handler) = registry.resolve_action("CounterController@show") else {
            panic!("expected resolved action");
        };

        let req = Request::builder("GET", "/counters/1").build().unwrap();
        let mut params = RouteParams::new();
        params.insert("id".to_string(), "1".to_string());

        let before = CONSTRUCTED.load(Ordering::SeqCst);
        let res = handler.call(&req, &params).unwrap();
        handler.call(&req, &params).unwrap();
        assert_eq!(res.body(), b"show 1");
        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst) - before, 2);
    }

    #[test]
    fn test_unknown_names() {
        let registry = ActionRegistry::new();
        assert!(matches!(
            registry.resolve_action("Missing@index"),
            Action::Unresolved(name) if name == "Missing@index"
        ));
        assert!(matches!(
            registry.resolve_middleware("auth"),
            Err(Error::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_named_fn_and_middleware() {
        let mut registry = ActionRegistry::new();
        registry
            .register_fn("home", |_req, _params| Ok(Response::text(200, "home")))
            .register_middleware(
                "noop",
                MiddlewareRef::shared(middleware_fn(|req, next| next.run(req))),
            );

        assert!(registry.resolve_action("home").is_resolved());
        assert!(registry.resolve_middleware("noop").is_ok());
        assert_eq!(action_name("UserController", "update"), "UserController@update");
    }
}
